use std::path::PathBuf;
use thiserror::Error;

use crate::template::TemplateError;

/// Format a YAML parse error for display, including the field path.
fn format_yaml_error(e: &serde_path_to_error::Error<serde_yaml::Error>) -> String {
    let path = e.path().to_string();
    let inner = e.inner();
    let msg = inner.to_string();

    let located = if let Some(loc) = inner.location() {
        format!("Line {}, Column {}: {}", loc.line(), loc.column(), msg)
    } else {
        msg
    };

    if path.is_empty() || path == "." {
        located
    } else {
        format!("{}: {}", path, located)
    }
}

/// Format a JSON parse error for display, including the field path.
fn format_json_error(e: &serde_path_to_error::Error<serde_json::Error>) -> String {
    let path = e.path().to_string();
    let msg = e.inner().to_string();
    if path.is_empty() || path == "." {
        msg
    } else {
        format!("{}: {}", path, msg)
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("could not read config '{}': {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format '{extension}' for '{}' (expected json, yaml or yml)", .path.display())]
    ConfigFormat { path: PathBuf, extension: String },

    #[error("failed to parse config file '{}':\n  {}", .path.display(), format_json_error(.source))]
    ConfigParseJson {
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },

    #[error("failed to parse config file '{}':\n  {}", .path.display(), format_yaml_error(.source))]
    ConfigParseYaml {
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_yaml::Error>,
    },

    #[error("invalid configuration:\n  {}", .issues.join("\n  "))]
    ConfigInvalid { issues: Vec<String> },

    #[error("template {template}: {source}")]
    TemplateInit {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("template {template}: too many consecutive failures ({failures})")]
    TooManyFailures { template: String, failures: u32 },

    #[error("all render workers failed:\n  {}", .errors.join("\n  "))]
    AllWorkersFailed { errors: Vec<String> },

    #[error("render workers reported errors:\n  {}", .errors.join("\n  "))]
    WorkerErrors { errors: Vec<String> },

    #[error("internal task failure: {0}")]
    Task(String),
}

impl AgentError {
    /// A fatal error tears the supervisor down and becomes the process exit
    /// status. Joined worker errors are the only non-fatal kind: the workers
    /// behind them have already exited individually.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AgentError::WorkerErrors { .. })
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
