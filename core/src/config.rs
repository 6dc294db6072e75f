//! Application configuration
//!
//! This module re-exports shared types from chronicle-types and provides
//! loading, environment overrides and platform path resolution for AppConfig.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use chronicle_types::{
    AppConfig, BackendKind, PlaybackSettings, ServerSettings, SpeechSettings, StorageSettings,
};

use crate::speech::CacheBounds;

const APP_NAME: &str = "chronicle";
const CONFIG_NAME: &str = "config";

/// Environment variables that take precedence over the config file
pub const ENV_ADMIN_PASSWORD: &str = "ADMIN_PASSWORD";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BLOB_TOKEN: &str = "CHRONICLE_BLOB_TOKEN";

/// Errors during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Load(#[from] confy::ConfyError),
}

// ─────────────────────────────────────────────────────────────────────────────
// AppConfig Extensions
// ─────────────────────────────────────────────────────────────────────────────

/// Extension trait for AppConfig persistence and derived settings
pub trait AppConfigExt: Sized {
    /// Load from disk, falling back to defaults, then apply environment overrides
    fn load() -> Self;
    fn try_load() -> Result<Self, ConfigError>;
    fn config_path() -> Option<PathBuf>;
    fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self;
    fn audio_cache_dir(&self) -> PathBuf;
    fn cache_bounds(&self) -> CacheBounds;
    fn settle_delay(&self) -> Duration;
    fn inter_item_delay(&self) -> Duration;
}

impl AppConfigExt for AppConfig {
    fn load() -> Self {
        let config = Self::try_load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Using default configuration");
            AppConfig::default()
        });
        config.with_overrides(|name| std::env::var(name).ok())
    }

    fn try_load() -> Result<Self, ConfigError> {
        Ok(confy::load(APP_NAME, CONFIG_NAME)?)
    }

    fn config_path() -> Option<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).ok()
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let present = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(password) = present(ENV_ADMIN_PASSWORD) {
            self.server.admin_password = password;
        }
        if let Some(key) = present(ENV_API_KEY) {
            self.speech.api_key = key;
        }
        if let Some(token) = present(ENV_BLOB_TOKEN) {
            self.storage.blob_token = token;
        }
        self
    }

    fn audio_cache_dir(&self) -> PathBuf {
        if !self.speech.cache_dir.is_empty() {
            return PathBuf::from(&self.speech.cache_dir);
        }
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join("audio")
    }

    fn cache_bounds(&self) -> CacheBounds {
        let max_age = match self.speech.cache_max_age_days {
            0 => None,
            days => Some(Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
        };
        CacheBounds {
            max_entries: self.speech.cache_max_entries,
            max_age,
        }
    }

    fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.playback.settle_delay_ms)
    }

    fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.playback.inter_item_delay_ms)
    }
}
