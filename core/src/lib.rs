pub mod config;
pub mod generate;
pub mod playback;
pub mod speech;
pub mod timeline;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::{AppConfigExt, ConfigError};
pub use generate::{AudioGenerator, GenerateError, GenerationReport, content_hash};
pub use playback::{
    NarrationHandle, NarrationService, NarrationStatus, PlaybackController, RodioOutput,
    TimelineView, create_narration_channel,
};
pub use speech::{SpeechRequest, SpeechSource};
pub use timeline::{PersistenceBackend, TimelineError, TimelineStore, open_backend};
