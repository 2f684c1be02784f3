//! The reload supervisor: the outermost loop multiplexing OS signals,
//! configuration reloads and fatal-error propagation across the render
//! process and the optional HTTP listener.
//!
//! SIGHUP tears the current generation down — every render worker drains
//! before the next generation spawns — re-reads the config and starts fresh.
//! A fatal error from the render process (or a config read failure during
//! reload) ends the supervisor and becomes the process exit status.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{self, AgentConfig};
use crate::errors::AgentError;
use crate::httplis;
use crate::logging;
use crate::process::RenderProcess;

/// Why a generation was cancelled. Workers surface this on exit; the
/// supervisor uses it to tell an operator reload from a hard stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    SighupReceived,
    Shutdown,
    FatalError,
}

impl CancelCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelCause::SighupReceived => "sighup_received",
            CancelCause::Shutdown => "shutdown",
            CancelCause::FatalError => "fatal_error",
        }
    }
}

/// One lifecycle of the worker pool between supervisor starts/reloads: a
/// child cancellation token that carries the cause it was cancelled with.
#[derive(Clone)]
pub struct Generation {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
}

impl Generation {
    pub fn child_of(root: &CancellationToken) -> Self {
        Generation {
            token: root.child_token(),
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// Record the cause and cancel. The first cause recorded wins; a root
    /// cancellation (no explicit cause) reads as shutdown.
    pub fn cancel(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cause(&self) -> Option<CancelCause> {
        self.cause.get().copied()
    }

    pub fn cause_str(&self) -> &'static str {
        self.cause().map(|c| c.as_str()).unwrap_or("shutdown")
    }
}

/// Run the supervisor until the root token is cancelled, reloading on SIGHUP.
#[cfg(unix)]
pub async fn run(root: CancellationToken, config_path: &Path) -> Result<(), AgentError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| AgentError::Task(format!("could not install SIGHUP handler: {}", e)))?;
    let (reload_tx, reload_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            if reload_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    run_with_reload(root, config_path, reload_rx).await
}

/// Reload signals do not exist off unix; the supervisor still honors
/// cancellation and fatal propagation.
#[cfg(not(unix))]
pub async fn run(root: CancellationToken, config_path: &Path) -> Result<(), AgentError> {
    let (_reload_tx, reload_rx) = mpsc::channel(1);
    run_with_reload(root, config_path, reload_rx).await
}

enum GenerationOutcome {
    Reload,
    Shutdown,
    Fatal(AgentError),
}

/// Supervisor loop driven by an explicit reload stream. `run` feeds it from
/// SIGHUP; tests and embedders can drive it directly.
pub async fn run_with_reload(
    root: CancellationToken,
    config_path: &Path,
    mut reload_rx: mpsc::Receiver<()>,
) -> Result<(), AgentError> {
    let config_path = PathBuf::from(config_path);
    let mut config = config::read_from_file(&config_path)?;
    logging::init(config.agent.log_level, config.agent.log_fmt);

    let mut reloaded = false;

    loop {
        let generation = Generation::child_of(&root);
        let mut process_task = Some(spawn_process(&generation, &config));
        let listener_task = spawn_listener(&generation, &config, reloaded);
        // scoped to the generation: an error superseded by a reload must not
        // surface as the final result of a later, clean shutdown
        let mut last_error: Option<AgentError> = None;

        if reloaded {
            info!(reloaded = true, "agent started");
        } else {
            info!("agent started");
        }

        let outcome = loop {
            tokio::select! {
                biased;
                _ = root.cancelled() => break GenerationOutcome::Shutdown,
                received = reload_rx.recv() => match received {
                    Some(()) => break GenerationOutcome::Reload,
                    None => break GenerationOutcome::Shutdown,
                },
                joined = join_process(&mut process_task) => {
                    match joined {
                        Ok(()) => info!("render process exited without errors"),
                        Err(e) if e.is_fatal() => break GenerationOutcome::Fatal(e),
                        Err(e) => {
                            error!(error = %e, "render process reported errors");
                            last_error = Some(e);
                        }
                    }
                }
            }
        };

        match outcome {
            GenerationOutcome::Reload => {
                info!("reload requested, stopping current generation");
                generation.cancel(CancelCause::SighupReceived);
                if let Some(task) = process_task.take() {
                    match flatten_join(task.await) {
                        Err(e) if e.is_fatal() => {
                            drain_listener(listener_task).await;
                            return Err(e);
                        }
                        Err(e) => {
                            error!(error = %e, "render process reported errors during reload")
                        }
                        Ok(()) => {}
                    }
                }
                drain_listener(listener_task).await;
                config = config::read_from_file(&config_path)?;
                reloaded = true;
            }
            GenerationOutcome::Fatal(e) => {
                error!(error = %e, "fatal error, shutting down");
                generation.cancel(CancelCause::FatalError);
                drain_listener(listener_task).await;
                return Err(e);
            }
            GenerationOutcome::Shutdown => {
                generation.cancel(CancelCause::Shutdown);
                if let Some(task) = process_task.take() {
                    if let Err(e) = flatten_join(task.await) {
                        last_error = Some(e);
                    }
                }
                drain_listener(listener_task).await;
                return match last_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
            }
        }
    }
}

fn spawn_process(
    generation: &Generation,
    config: &AgentConfig,
) -> JoinHandle<Result<(), AgentError>> {
    let process = RenderProcess::new(&config.agent);
    let generation = generation.clone();
    let templates = config.templates.clone();
    tokio::spawn(process.start(generation, templates))
}

fn spawn_listener(
    generation: &Generation,
    config: &AgentConfig,
    reloaded: bool,
) -> Option<JoinHandle<()>> {
    let addr = config.agent.http_listener_addr.clone()?;
    let generation = generation.clone();
    Some(tokio::spawn(httplis::serve(generation, addr, reloaded)))
}

async fn join_process(
    task: &mut Option<JoinHandle<Result<(), AgentError>>>,
) -> Result<(), AgentError> {
    match task.as_mut() {
        Some(handle) => {
            let joined = handle.await;
            *task = None;
            flatten_join(joined)
        }
        None => std::future::pending().await,
    }
}

fn flatten_join(
    joined: Result<Result<(), AgentError>, tokio::task::JoinError>,
) -> Result<(), AgentError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(AgentError::Task(format!("render process task failed: {}", e))),
    }
}

async fn drain_listener(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        let _ = task.await;
    }
}
