use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chronicle_core::TimelineError;
use chronicle_core::speech::SpeechError;
use serde_json::{Value, json};

use crate::describe;

/// Error response: a status code and the JSON body the web client expects
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(StatusCode::BAD_REQUEST, json!({ "message": message }))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(StatusCode::NOT_FOUND, json!({ "message": message }))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Failure while reading the timeline
    pub fn retrieval(err: TimelineError) -> Self {
        tracing::error!(error = %describe(&err), "Failed to read timeline");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "Error retrieving timeline data", "error": describe(&err) }),
        )
    }
}

impl From<TimelineError> for ApiError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::Auth => {
                Self::new(StatusCode::UNAUTHORIZED, json!({ "message": "Unauthorized" }))
            }
            TimelineError::Validation { reason } => Self::bad_request(reason),
            TimelineError::Conflict { id, existing } => Self::new(
                StatusCode::CONFLICT,
                json!({
                    "message": format!("A milestone with id '{}' already exists", id),
                    "existingMilestone": existing,
                }),
            ),
            TimelineError::NotFound => Self::not_found("Timeline data not found"),
            other => {
                tracing::error!(error = %describe(&other), "Timeline storage failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal Server Error", "error": describe(&other) }),
                )
            }
        }
    }
}

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::EmptyText => {
                Self::new(StatusCode::BAD_REQUEST, json!({ "error": "Text is required" }))
            }
            SpeechError::MissingApiKey => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "OpenAI API key is not configured" }),
            ),
            other => {
                tracing::error!(error = %describe(&other), "Speech synthesis failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to generate speech", "details": describe(&other) }),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
