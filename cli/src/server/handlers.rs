use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chronicle_core::speech::SpeechError;
use chronicle_types::{TimelineDocument, TimelineEntry, Voice};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ServerState;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTimelineRequest {
    pub timeline_data: TimelineDocument,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub milestone: TimelineEntry,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeechBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice: Option<Voice>,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub audio: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

pub async fn get_timeline(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<TimelineDocument>, ApiError> {
    let document = state.store.document().await.map_err(ApiError::retrieval)?;
    Ok(Json(document))
}

pub async fn save_timeline(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SaveTimelineRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body(payload)?;
    state
        .store
        .save(request.timeline_data, &request.password)
        .await?;
    Ok(Json(json!({ "message": "Timeline data saved successfully" })))
}

pub async fn create_entry(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CreateEntryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let milestone = state
        .store
        .create_entry(request.milestone, &request.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Milestone created successfully", "milestone": milestone })),
    )
        .into_response())
}

pub async fn authenticate(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body(payload)?;
    if state.store.authorize(&request.password).is_err() {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            json!({ "message": "Invalid password" }),
        ));
    }
    Ok(Json(json!({ "message": "Authentication successful" })))
}

pub async fn speech(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SpeechBody>, JsonRejection>,
) -> Result<Json<SpeechResponse>, ApiError> {
    let request = body(payload)?;
    if request.text.trim().is_empty() {
        return Err(SpeechError::EmptyText.into());
    }
    let voice = request.voice.unwrap_or_default();
    tracing::debug!(voice = %voice, chars = request.text.len(), "Speech request");

    let audio = state.synth.synthesize(&request.text, voice).await?;
    Ok(Json(SpeechResponse {
        audio: STANDARD.encode(audio),
    }))
}

pub async fn audio_asset(
    State(state): State<Arc<ServerState>>,
    Path((voice, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::not_found("Audio not found");

    let voice: Voice = voice.parse().map_err(|_| not_found())?;
    let entry_id = file
        .strip_suffix(&format!(".{}", state.asset_extension))
        .ok_or_else(not_found)?;

    let audio = match state.assets.fetch(entry_id, voice).await {
        Ok(Some(audio)) => audio,
        Ok(None) => return Err(not_found()),
        Err(e) => {
            tracing::warn!(error = %crate::describe(&e), entry_id, "Audio asset unreadable");
            return Err(not_found());
        }
    };

    Ok((
        [(header::CONTENT_TYPE, content_type(&state.asset_extension))],
        audio,
    )
        .into_response())
}

fn content_type(extension: &str) -> &'static str {
    match extension {
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        _ => "audio/mpeg",
    }
}
