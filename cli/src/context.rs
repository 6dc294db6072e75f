use std::sync::Arc;

use chronicle_core::config::AppConfig;
use chronicle_core::speech::{open_audio_cache, static_assets, synthesizer};
use chronicle_core::timeline::sorted_entries;
use chronicle_core::{AppConfigExt, SpeechSource, TimelineStore, open_backend};
use chronicle_types::TimelineEntry;
use tokio::sync::RwLock;

use crate::describe;

/// Holds all shared state for the CLI application.
#[derive(Clone)]
pub struct CliContext {
    pub config: Arc<RwLock<AppConfig>>,
    pub store: Arc<TimelineStore>,
}

impl CliContext {
    /// Open the configured persistence backend. Writes are checked against
    /// the configured admin password.
    pub fn new(config: AppConfig) -> Result<Self, String> {
        let backend = open_backend(&config.storage).map_err(|e| describe(&e))?;
        let store = TimelineStore::new(backend, config.server.admin_password.clone());
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store: Arc::new(store),
        })
    }

    /// Entries in display order
    pub async fn entries(&self) -> Result<Vec<TimelineEntry>, String> {
        let document = self.store.document().await.map_err(|e| describe(&e))?;
        Ok(sorted_entries(&document.timeline))
    }

    /// Cache, static assets and synthesizer chained for narration
    pub async fn speech_source(&self) -> Result<SpeechSource, String> {
        let config = self.config.read().await;
        let cache = open_audio_cache(&config.audio_cache_dir(), config.cache_bounds()).await;
        let assets = static_assets(&config.speech).map_err(|e| describe(&e))?;
        let synth = synthesizer(&config.speech).map_err(|e| describe(&e))?;
        Ok(SpeechSource::new(cache, assets, synth))
    }

    /// Password used when a command was given none
    pub async fn default_password(&self) -> String {
        self.config.read().await.server.admin_password.clone()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use chronicle_types::BackendKind;

    use super::*;

    #[tokio::test]
    async fn missing_timeline_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = file_context(dir.path());
        assert!(ctx.entries().await.unwrap().is_empty());
        assert_eq!(ctx.store.backend_name(), "file");
    }

    #[test]
    fn misconfigured_backend_is_reported() {
        let mut config = AppConfig::default();
        config.storage.backend = BackendKind::Blob;
        let err = CliContext::new(config).err().unwrap();
        assert!(err.contains("blob_url"));
    }
}
