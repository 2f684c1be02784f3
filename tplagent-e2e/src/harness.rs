//! Shared helpers for the end-to-end tests: spec builders and wait-until
//! polling utilities.

use std::path::Path;
use std::time::Duration;

use tplagent_agent::config::{
    ActionConfig, AgentSpec, ExecSpec, LogFmt, LogLevel, MissingKeyPolicy, RawPayload,
    TemplateSpec,
};

/// An agent block suitable for tests: quiet logging, explicit breaker limit.
pub fn agent_spec(max_consecutive_failures: u32) -> AgentSpec {
    AgentSpec {
        log_level: LogLevel::Error,
        log_fmt: LogFmt::Text,
        max_consecutive_failures,
        http_listener_addr: None,
    }
}

/// Builder for template specs so tests only state what they care about.
pub struct TemplateSpecBuilder {
    spec: TemplateSpec,
}

impl TemplateSpecBuilder {
    pub fn raw(raw: &str, destination: &Path) -> Self {
        TemplateSpecBuilder {
            spec: TemplateSpec {
                actions: Vec::new(),
                template_delimiters: None,
                source: None,
                raw: Some(raw.to_string()),
                destination: destination.to_string_lossy().into_owned(),
                html: false,
                static_data: serde_json::Value::Null,
                refresh_interval: Duration::from_secs(1),
                refresh_on_trigger: false,
                render_once: false,
                missing_key: MissingKeyPolicy::EngineDefault,
                exec: None,
            },
        }
    }

    pub fn static_data(mut self, data: serde_json::Value) -> Self {
        self.spec.static_data = data;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.spec.refresh_interval = interval;
        self
    }

    pub fn render_once(mut self) -> Self {
        self.spec.render_once = true;
        self
    }

    pub fn refresh_on_trigger(mut self) -> Self {
        self.spec.refresh_on_trigger = true;
        self
    }

    pub fn missing_key(mut self, policy: MissingKeyPolicy) -> Self {
        self.spec.missing_key = policy;
        self
    }

    pub fn action(mut self, name: &str, config: serde_json::Value) -> Self {
        let payload: RawPayload = serde_json::from_value(config).expect("action config");
        self.spec.actions.push(ActionConfig {
            name: name.to_string(),
            config: payload,
        });
        self
    }

    pub fn exec(mut self, cmd: &str, args: &[&str]) -> Self {
        self.spec.exec = Some(ExecSpec {
            cmd: cmd.to_string(),
            cmd_args: args.iter().map(|a| a.to_string()).collect(),
            cmd_timeout: Some(Duration::from_secs(5)),
            env: Default::default(),
        });
        self
    }

    pub fn build(self) -> TemplateSpec {
        self.spec
    }
}

/// Poll until the file at `path` holds exactly `expected`, or panic after
/// `timeout`.
pub async fn wait_for_content(path: &Path, expected: &str, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if contents == expected {
                return;
            }
        }
        if tokio::time::Instant::now() > deadline {
            let got = std::fs::read_to_string(path).ok();
            panic!(
                "timed out waiting for {:?} to contain {:?}, last saw {:?}",
                path, expected, got
            );
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Poll until `cond` returns true, or panic after `timeout`.
pub async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration, what: &str) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
