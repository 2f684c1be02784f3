//! HTTP control plane: lets operators replace the whole configuration or
//! stop the agent without shell access to the host.
//!
//! `POST /config/reload` validates the submitted config, atomically swaps it
//! into the config file (old contents are kept at `<path>.bak`) and sends the
//! agent a SIGHUP. `POST /agent/stop` sends SIGINT. The listener is scoped to
//! one generation and shuts down within a 1s grace period on teardown.

use std::fs;
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::{self, AgentConfig};
use crate::supervisor::Generation;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ReloadRequest {
    config: AgentConfig,
    config_path: String,
}

/// Serve the control endpoints on `addr` until the generation is cancelled.
pub async fn serve(generation: Generation, addr: String, reloaded: bool) {
    let app = Router::new()
        .route("/config/reload", post(reload_config))
        .route("/agent/stop", post(stop_agent));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "http listener bind failed");
            return;
        }
    };

    if reloaded {
        info!(addr = %addr, reloaded = true, "http listener started");
    } else {
        info!(addr = %addr, "http listener started");
    }

    let shutdown = generation.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        served = &mut server => {
            if let Err(e) = served {
                error!(error = %e, "http listener error");
            }
        }
        _ = async {
            generation.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            // grace elapsed with connections still open; abandon them
        }
    }

    info!("http listener exited");
}

async fn stop_agent() -> (StatusCode, Json<serde_json::Value>) {
    info!(cause = "http stop triggered", "stopping agent");
    match send_self_signal(SelfSignal::Interrupt) {
        Ok(()) => (StatusCode::OK, Json(json!({"success": true}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e})),
        ),
    }
}

async fn reload_config(
    payload: Result<Json<ReloadRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": rejection.body_text()})),
            )
        }
    };

    let config_path = PathBuf::from(&request.config_path);
    if !config_path.exists() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("file not found at {}", config_path.display())})),
        );
    }

    if let Err(e) = config::validate(&request.config) {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()})));
    }

    if let Err(e) = backup_and_replace(&config_path, &request.config) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e})),
        );
    }
    info!(path = %config_path.display(), "wrote new config");

    match send_self_signal(SelfSignal::Hangup) {
        Ok(()) => (StatusCode::OK, Json(json!({"success": true}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e})),
        ),
    }
}

/// Atomically swap the new config into `path`: old contents go to
/// `<path>.bak`, the new document is written to `<path>.temp` and renamed
/// over the original. The document is encoded to match the file's extension
/// so the subsequent reload parses it.
pub fn backup_and_replace(path: &Path, config: &AgentConfig) -> Result<(), String> {
    let backup = path_with_suffix(path, ".bak");
    fs::copy(path, &backup).map_err(|e| format!("could not back up config: {}", e))?;

    let encoded = encode_for(path, config)?;

    let temp = path_with_suffix(path, ".temp");
    if let Err(e) = fs::write(&temp, encoded) {
        let _ = fs::remove_file(&backup);
        return Err(format!("could not write new config: {}", e));
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(format!("could not replace config: {}", e));
    }
    Ok(())
}

fn encode_for(path: &Path, config: &AgentConfig) -> Result<Vec<u8>, String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yaml" | "yml" => serde_yaml::to_string(config)
            .map(String::into_bytes)
            .map_err(|e| format!("could not encode config: {}", e)),
        _ => serde_json::to_vec_pretty(config)
            .map_err(|e| format!("could not encode config: {}", e)),
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    os.into()
}

enum SelfSignal {
    Hangup,
    Interrupt,
}

#[cfg(unix)]
fn send_self_signal(signal: SelfSignal) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        SelfSignal::Hangup => Signal::SIGHUP,
        SelfSignal::Interrupt => Signal::SIGINT,
    };
    kill(Pid::this(), signal).map_err(|e| format!("could not signal agent: {}", e))
}

#[cfg(not(unix))]
fn send_self_signal(_signal: SelfSignal) -> Result<(), String> {
    Err("self-signaling is not supported on this platform".to_string())
}
