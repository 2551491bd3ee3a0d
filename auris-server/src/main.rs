//! Auris transcription relay — server entry point.
//!
//! One process hosts the WebSocket transcription endpoint plus the small
//! read-side API over the shared session transcript. Each WebSocket
//! connection gets its own pipeline and adapter; the transcript log is the
//! only state shared between them.

mod settings;
mod ws;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use auris_core::{AdapterSettings, Pipeline, SessionTranscript};

use settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionTranscript,
    pub pipeline: Arc<Pipeline>,
    pub adapter_settings: AdapterSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let settings = Settings::parse();
    info!(
        engine = %settings.engine,
        language = %settings.language,
        sample_rate_hz = settings.sample_rate_hz,
        force_stub = settings.force_stub,
        "configuration loaded"
    );

    let session = SessionTranscript::new();
    let pipeline = Arc::new(Pipeline::new(session.clone(), settings.pipeline_config()));
    let state = AppState {
        session,
        pipeline,
        adapter_settings: settings.adapter_settings(),
    };

    let app = Router::new()
        .route("/ws/transcription", get(ws::transcription_ws))
        .route("/api/status", get(status))
        .route("/api/transcript", get(transcript))
        .route("/api/session/reset", post(reset_session))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "transcription server listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_logging() {
    let filter = std::env::var("AURIS_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "transcript_count": state.session.len(),
    }))
}

async fn transcript(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "transcript": state.session.snapshot() }))
}

async fn reset_session(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.session.clear();
    Json(json!({ "status": "reset", "cleared": cleared }))
}
