//! Starter-config generation for the `genconf` subcommand.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use super::{
    ActionConfig, AgentConfig, AgentSpec, ExecSpec, LogFmt, LogLevel, MissingKeyPolicy,
    TemplateSpec,
};

/// Write a starter configuration with `blocks` template entries, indented by
/// `indent` spaces. The output parses and validates through the normal config
/// loading path.
pub fn write_starter_config<W: Write>(wr: &mut W, blocks: usize, indent: usize) -> io::Result<()> {
    let starter = starter_config(blocks);

    let indent_str = " ".repeat(indent);
    {
        let formatter = PrettyFormatter::with_indent(indent_str.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut *wr, formatter);
        starter.serialize(&mut ser).map_err(io::Error::other)?;
    }
    writeln!(wr)
}

fn starter_config(blocks: usize) -> AgentConfig {
    let mut templates = BTreeMap::new();
    for i in 1..=blocks {
        templates.insert(format!("myapp-config{}", i), starter_template_block(i));
    }

    AgentConfig {
        agent: AgentSpec {
            log_level: LogLevel::Info,
            log_fmt: LogFmt::Text,
            max_consecutive_failures: 10,
            http_listener_addr: None,
        },
        templates,
    }
}

fn starter_template_block(i: usize) -> TemplateSpec {
    TemplateSpec {
        actions: Vec::<ActionConfig>::new(),
        template_delimiters: None,
        source: Some(format!("/path/to/template-file{}", i)),
        raw: None,
        destination: format!("/path/to/outfile{}", i),
        html: false,
        static_data: serde_json::json!({"key": "value"}),
        refresh_interval: Duration::from_secs(1),
        refresh_on_trigger: false,
        render_once: false,
        missing_key: MissingKeyPolicy::Error,
        exec: Some(ExecSpec {
            cmd: "echo".to_string(),
            cmd_args: vec!["hello".to_string()],
            cmd_timeout: Some(Duration::from_secs(30)),
            env: Default::default(),
        }),
    }
}
