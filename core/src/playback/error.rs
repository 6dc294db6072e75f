//! Error types for audio playback

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output device: {0}")]
    NoDevice(String),

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("audio output failed: {0}")]
    Output(String),

    #[error("audio output thread has stopped")]
    OutputClosed,
}
