//! HTTP trigger service: kicks off a tracker sweep on demand and serves the
//! roster file.
//!
//! The sweep runs as a subprocess rather than in-process so a wedged run
//! can be bounded by a hard timeout without poisoning the server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::process::Command;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "sjt-web";

#[derive(Clone)]
pub struct AppState {
    pub tracker_bin: String,
    pub data_path: PathBuf,
    pub run_timeout: Duration,
}

impl AppState {
    pub fn new(tracker_bin: impl Into<String>, data_path: impl Into<PathBuf>) -> Self {
        Self {
            tracker_bin: tracker_bin.into(),
            data_path: data_path.into(),
            run_timeout: Duration::from_secs(300),
        }
    }

    pub fn from_env() -> Self {
        let mut state = Self::new(
            std::env::var("SJT_TRACKER_BIN").unwrap_or_else(|_| "sjt-cli".to_string()),
            std::env::var("SJT_DATA_PATH").unwrap_or_else(|_| "main/data.json".to_string()),
        );
        if let Some(secs) = std::env::var("SJT_REFRESH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            state.run_timeout = Duration::from_secs(secs);
        }
        state
    }
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    success: String,
    output: String,
    error: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/refresh", post(refresh_handler))
        .route("/data", get(data_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let host = std::env::var("SJT_WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("SJT_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5001);
    let state = AppState::from_env();
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!(%host, port, "refresh service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    let data_path = state.data_path.display().to_string();
    info!(tracker = %state.tracker_bin, data = %data_path, "refresh requested");

    // kill_on_drop so a timed-out tracker is terminated rather than left
    // running (and possibly writing the roster) after we have answered.
    let result = tokio::time::timeout(
        state.run_timeout,
        Command::new(&state.tracker_bin)
            .args(["run", "--input", data_path.as_str(), "--output", data_path.as_str()])
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let success = output.status.success();
            if !success {
                warn!(code = ?output.status.code(), "tracker run failed");
            }
            Json(RefreshResponse {
                success: success.to_string(),
                output: String::from_utf8_lossy(&output.stdout).to_string(),
                error: if success {
                    None
                } else {
                    Some(String::from_utf8_lossy(&output.stderr).to_string())
                },
            })
            .into_response()
        }
        Ok(Err(err)) => server_error(anyhow::anyhow!("spawning tracker: {err}")),
        Err(_) => server_error(anyhow::anyhow!(
            "tracker run timed out after {} seconds",
            state.run_timeout.as_secs()
        )),
    }
}

async fn data_handler(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(&state.data_path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "roster file not found" })),
        )
            .into_response(),
    }
}

async fn health_handler() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "refresh request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "success": "false", "error": err.to_string() })),
    )
        .into_response()
}
