//! HTTP API for the timeline editor and the browser narrator
//!
//! - `GET/POST /api/timeline`: read or replace the whole document
//! - `POST /api/entries`: add one entry
//! - `POST /api/auth`: check the editing password
//! - `POST /api/speech`: synthesize narration audio (base64)
//! - `GET /audio/{voice}/{file}`: pre-generated narration audio

mod error;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chronicle_core::TimelineStore;
use chronicle_core::speech::{
    OpenAiSynthesizer, StaticAssets, Synthesizer, Unconfigured, static_assets,
};
use chronicle_types::SpeechSettings;
use tokio::net::TcpListener;

pub use error::ApiError;

use crate::context::CliContext;
use crate::describe;

/// Shared server state
pub struct ServerState {
    pub store: Arc<TimelineStore>,
    pub synth: Arc<dyn Synthesizer>,
    pub assets: Arc<dyn StaticAssets>,
    /// Extension of files served under `/audio`
    pub asset_extension: String,
}

impl ServerState {
    /// The server always talks to the provider itself; a configured speech
    /// proxy would point back at this server.
    pub fn from_settings(
        store: Arc<TimelineStore>,
        speech: &SpeechSettings,
    ) -> Result<Self, String> {
        let synth: Arc<dyn Synthesizer> = if speech.api_key.is_empty() {
            tracing::warn!("No speech API key configured; /api/speech will fail");
            Arc::new(Unconfigured)
        } else {
            Arc::new(OpenAiSynthesizer::new(speech).map_err(|e| describe(&e))?)
        };
        let assets = static_assets(speech).map_err(|e| describe(&e))?;
        Ok(Self {
            store,
            synth,
            assets,
            asset_extension: speech.asset_extension.clone(),
        })
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(
            "/api/timeline",
            get(handlers::get_timeline).post(handlers::save_timeline),
        )
        .route("/api/entries", post(handlers::create_entry))
        .route("/api/auth", post(handlers::authenticate))
        .route("/api/speech", post(handlers::speech))
        .route("/audio/:voice/:file", get(handlers::audio_asset))
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(ctx: &CliContext, bind: Option<String>) -> Result<(), String> {
    let config = ctx.config.read().await.clone();
    let state = ServerState::from_settings(Arc::clone(&ctx.store), &config.speech)?;
    let address = bind.unwrap_or(config.server.bind_address);

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", address, e))?;

    tracing::info!(
        address = %address,
        backend = ctx.store.backend_name(),
        "Timeline server listening"
    );

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    tracing::info!("Timeline server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
