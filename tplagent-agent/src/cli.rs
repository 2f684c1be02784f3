//! Command surface of the `tplagent` binary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::{config, pid_file_path, supervisor};

const DEFAULT_CONFIG_PATH: &str = "/etc/tplagent/config.json";

#[derive(Parser, Debug)]
#[command(name = "tplagent", about = "Keeps rendered configuration files in sync with dynamic data sources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent until interrupted
    Start {
        /// Path to the configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print a starter configuration on stdout
    Genconf {
        /// Number of template blocks to generate
        #[arg(short = 'n', long = "blocks", default_value_t = 1)]
        blocks: usize,
        /// Indentation width of the generated JSON
        #[arg(long, default_value_t = 2)]
        indent: usize,
    },
    /// Signal a running agent to reload its configuration
    Reload,
    /// Print version information
    Version,
}

/// Run the supervisor until SIGINT/SIGTERM. The PID file is written before
/// the first generation starts and removed on the way out.
pub async fn start(config_path: &Path) -> Result<()> {
    let pid_file = write_pid_file();

    let root = CancellationToken::new();
    install_shutdown_signals(&root)?;

    let result = supervisor::run(root, config_path).await;

    if let Some(pid_file) = pid_file {
        let _ = fs::remove_file(pid_file);
    }
    result.map_err(Into::into)
}

fn write_pid_file() -> Option<PathBuf> {
    let dir = crate::pid_dir();
    if let Err(e) = fs::create_dir_all(&dir) {
        eprintln!("warning: could not create pid dir {}: {}", dir.display(), e);
        return None;
    }
    let path = pid_file_path();
    match fs::write(&path, std::process::id().to_string()) {
        Ok(()) => Some(path),
        Err(e) => {
            eprintln!("warning: could not write pid file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(unix)]
fn install_shutdown_signals(root: &CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("could not install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("could not install SIGTERM handler")?;
    let root = root.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        root.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_shutdown_signals(root: &CancellationToken) -> Result<()> {
    let root = root.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        root.cancel();
    });
    Ok(())
}

/// Emit a starter config on the given writer.
pub fn genconf<W: Write>(wr: &mut W, blocks: usize, indent: usize) -> Result<()> {
    config::write_starter_config(wr, blocks, indent).context("error generating config")
}

/// Read the PID file and send the running agent a SIGHUP.
#[cfg(unix)]
pub fn reload() -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid_file = pid_file_path();
    let contents = fs::read_to_string(&pid_file)
        .with_context(|| format!("could not read pid file {}", pid_file.display()))?;
    let pid: i32 = contents
        .trim()
        .parse()
        .with_context(|| format!("invalid pid file contents: {:?}", contents.trim()))?;

    kill(Pid::from_raw(pid), Signal::SIGHUP)
        .with_context(|| format!("could not signal pid {}", pid))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn reload() -> Result<()> {
    anyhow::bail!("reload is only supported on unix hosts")
}

pub fn version<W: Write>(wr: &mut W) -> Result<()> {
    writeln!(
        wr,
        "tplagent {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )?;
    Ok(())
}
