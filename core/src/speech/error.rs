//! Error types for speech resolution and the audio cache

use std::path::PathBuf;
use thiserror::Error;

/// Errors while obtaining audio for a narration
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("text is required")]
    EmptyText,

    #[error("speech API key is not configured")]
    MissingApiKey,

    #[error("speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("speech synthesis timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("speech request failed")]
    Request(#[source] reqwest::Error),

    #[error("invalid base64 audio payload")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to read audio asset {path}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpeechError {
    pub(crate) fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis {
            message: message.into(),
        }
    }
}

/// Errors from an audio cache backend. Callers treat every one of these as
/// a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}
