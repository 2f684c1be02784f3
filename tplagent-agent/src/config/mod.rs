//! Agent configuration: data model, file loading and validation.
//!
//! A config file is JSON or YAML, selected by file extension. Loading runs the
//! full validation contract; a config that fails validation is rejected before
//! any render worker is spawned.

pub mod duration;
pub mod expand;
mod gen_conf;
mod payload;

pub use gen_conf::write_starter_config;
pub use payload::RawPayload;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AgentError, Result};

/// Log verbosity for the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Log output format. Required in the config; anything other than `text` or
/// `json` is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFmt {
    Text,
    Json,
}

/// Missing-key policy for template execution. Unknown values fall back to the
/// engine default rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKeyPolicy {
    #[default]
    EngineDefault,
    Error,
    Zero,
    Default,
}

impl MissingKeyPolicy {
    fn from_str(s: &str) -> Self {
        match s.trim() {
            "error" => MissingKeyPolicy::Error,
            "zero" => MissingKeyPolicy::Zero,
            "default" => MissingKeyPolicy::Default,
            _ => MissingKeyPolicy::EngineDefault,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MissingKeyPolicy::EngineDefault => "",
            MissingKeyPolicy::Error => "error",
            MissingKeyPolicy::Zero => "zero",
            MissingKeyPolicy::Default => "default",
        }
    }
}

impl<'de> Deserialize<'de> for MissingKeyPolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(MissingKeyPolicy::from_str(&s))
    }
}

impl Serialize for MissingKeyPolicy {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// The `agent` block of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub log_level: LogLevel,
    pub log_fmt: LogFmt,
    /// Consecutive tick failures before a render worker exits fatally.
    /// Zero means the default of 10.
    #[serde(default)]
    pub max_consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_listener_addr: Option<String>,
}

/// One `{name, config}` action attachment on a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub config: RawPayload,
}

/// Post-render command description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSpec {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd_args: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "duration::deserialize_optional_duration",
        serialize_with = "duration::serialize_optional_duration"
    )]
    pub cmd_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// A named template block from the `templates` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_delimiters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub destination: String,
    #[serde(default)]
    pub html: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub static_data: serde_json::Value,
    #[serde(
        default,
        deserialize_with = "duration::deserialize_duration",
        serialize_with = "duration::serialize_duration"
    )]
    pub refresh_interval: Duration,
    #[serde(default)]
    pub refresh_on_trigger: bool,
    #[serde(default)]
    pub render_once: bool,
    #[serde(default)]
    pub missing_key: MissingKeyPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecSpec>,
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSpec,
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateSpec>,
}

/// Read and validate a config file. The path itself may contain `$VAR`
/// references.
pub fn read_from_file(path: &Path) -> Result<AgentConfig> {
    let expanded = expand::expand_str(&path.to_string_lossy());
    let path = PathBuf::from(expanded);

    let text = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AgentError::ConfigNotFound(path.clone())
        } else {
            AgentError::ConfigRead {
                path: path.clone(),
                source: e,
            }
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config: AgentConfig = match ext {
        "json" => {
            let mut de = serde_json::Deserializer::from_str(&text);
            serde_path_to_error::deserialize(&mut de).map_err(|e| AgentError::ConfigParseJson {
                path: path.clone(),
                source: e,
            })?
        }
        "yaml" | "yml" => {
            let de = serde_yaml::Deserializer::from_str(&text);
            serde_path_to_error::deserialize(de).map_err(|e| AgentError::ConfigParseYaml {
                path: path.clone(),
                source: e,
            })?
        }
        other => {
            return Err(AgentError::ConfigFormat {
                path: path.clone(),
                extension: other.to_string(),
            })
        }
    };

    validate(&config)?;
    Ok(config)
}

fn is_valid_template_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate a configuration document against the contract every caller of the
/// render pipeline relies on. Issues are collected so one pass reports them
/// all.
pub fn validate(config: &AgentConfig) -> Result<()> {
    let mut issues = Vec::new();

    for (name, spec) in &config.templates {
        if !is_valid_template_name(name) {
            issues.push(format!(
                "invalid template name {:?}: only letters, digits, '_' and '-' are allowed",
                name
            ));
        }

        let interval = spec.refresh_interval;
        if !interval.is_zero() && interval < Duration::from_secs(1) {
            issues.push(format!("{}: refresh_interval must be zero or at least 1s", name));
        }

        let has_raw = spec.raw.as_deref().is_some_and(|s| !s.is_empty());
        let has_source = spec.source.as_deref().is_some_and(|s| !s.is_empty());
        if has_raw == has_source {
            issues.push(format!("{}: exactly one of raw or source must be set", name));
        }

        if let Some(delims) = &spec.template_delimiters {
            if delims.len() != 2 {
                issues.push(format!(
                    "{}: template_delimiters must contain exactly a left and a right delimiter",
                    name
                ));
            }
        }

        for (i, action) in spec.actions.iter().enumerate() {
            if action.name.is_empty() {
                issues.push(format!("{}: actions[{}] name cannot be empty", name, i));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AgentError::ConfigInvalid { issues })
    }
}

#[cfg(test)]
mod tests;
