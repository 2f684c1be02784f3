//! Post-render command execution.
//!
//! Commands run with an explicit environment only, a timeout of their own,
//! and captured stderr. They never inherit the render worker's cancellation:
//! a graceful shutdown that already wrote the artifact still lets the
//! notification command finish within its timeout.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("command failed with status {status}")]
    Failed { status: i32, stderr: String },

    #[error("command {cmd} timed out after {timeout:?}")]
    TimedOut { cmd: String, timeout: Duration },

    #[error("command failed to run: {0}")]
    Io(#[source] std::io::Error),
}

/// A configured `{cmd, args, env, timeout}` subprocess. Args are frozen at
/// configuration time; `$VAR` expansion has already happened by the time an
/// executor exists.
#[derive(Debug, Clone)]
pub struct Executor {
    cmd: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl Executor {
    pub fn new(
        cmd: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        Executor {
            cmd,
            args,
            env,
            timeout,
        }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn exec(&self) -> Result<(), ExecError> {
        let mut command = Command::new(&self.cmd);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExecError::NotFound(self.cmd.clone()))
            }
            Err(e) => return Err(ExecError::Io(e)),
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(waited) => waited.map_err(ExecError::Io)?,
            // dropping the wait future kills the child via kill_on_drop
            Err(_) => {
                return Err(ExecError::TimedOut {
                    cmd: self.cmd.clone(),
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(ExecError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}
