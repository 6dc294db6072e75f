//! Error types for timeline persistence

use std::path::PathBuf;

use chronicle_types::TimelineEntry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("invalid or missing credential")]
    Auth,

    #[error("invalid timeline data: {reason}")]
    Validation { reason: String },

    #[error("an entry with id '{id}' already exists")]
    Conflict {
        id: String,
        existing: Box<TimelineEntry>,
    },

    #[error("timeline document not found")]
    NotFound,

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed timeline document")]
    Parse(#[from] serde_json::Error),

    #[error("blob store request failed")]
    BlobRequest(#[from] reqwest::Error),

    #[error("blob store answered {status}: {message}")]
    BlobStatus { status: u16, message: String },

    #[error("timeline database error")]
    Database(#[from] rusqlite::Error),

    #[error("timeline database task failed")]
    Task(#[from] tokio::task::JoinError),

    #[error("storage backend is not configured: {reason}")]
    Misconfigured { reason: String },
}

impl TimelineError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
