//! Static narration audio pre-generation
//!
//! Writes `{root}/{voice}/{id}.{ext}` for every entry and keeps a
//! `content-hashes.json` map (entry id -> SHA-256 of the narration text) in
//! the asset root so unchanged entries are skipped on the next run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chronicle_types::{TimelineEntry, Voice};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::speech::{DirAssets, SpeechError, Synthesizer};

pub const CONTENT_HASH_FILE: &str = "content-hashes.json";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode content hashes")]
    Hashes(#[from] serde_json::Error),

    #[error("entry id '{id}' cannot be used as a file name")]
    UnusableId { id: String },

    #[error(transparent)]
    Speech(#[from] SpeechError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Audio files written
    pub generated: usize,
    /// Entries skipped because nothing changed
    pub unchanged: usize,
    pub errors: usize,
}

/// Hex SHA-256 of the narration text
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

pub struct AudioGenerator {
    synth: Arc<dyn Synthesizer>,
    assets: DirAssets,
    voices: Vec<Voice>,
    delay: Duration,
}

impl AudioGenerator {
    pub fn new(synth: Arc<dyn Synthesizer>, assets: DirAssets, voices: Vec<Voice>) -> Self {
        Self {
            synth,
            assets,
            voices,
            delay: Duration::ZERO,
        }
    }

    /// Pause after each provider request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn hash_file(&self) -> PathBuf {
        self.assets.root().join(CONTENT_HASH_FILE)
    }

    async fn load_hashes(&self) -> BTreeMap<String, String> {
        let path = self.hash_file();
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "Ignoring unreadable content hashes");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }

    async fn save_hashes(&self, hashes: &BTreeMap<String, String>) -> Result<(), GenerateError> {
        let path = self.hash_file();
        create_dir(self.assets.root()).await?;
        let json = serde_json::to_string_pretty(hashes)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| GenerateError::Write { path, source })
    }

    async fn all_voices_present(&self, entry_id: &str) -> bool {
        for voice in &self.voices {
            let Some(path) = self.assets.path_for(entry_id, *voice) else {
                return false;
            };
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!(entry_id, %voice, "Audio file missing, will regenerate");
                return false;
            }
        }
        true
    }

    pub async fn generate(&self, entries: &[TimelineEntry]) -> Result<GenerationReport, GenerateError> {
        let previous = self.load_hashes().await;
        let mut hashes = BTreeMap::new();
        let mut report = GenerationReport::default();

        tracing::info!(entries = entries.len(), voices = self.voices.len(), "Generating narration audio");

        for (position, entry) in entries.iter().enumerate() {
            if self.assets.path_for(&entry.id, Voice::default()).is_none() {
                tracing::error!(index = position, id = %entry.id, "Entry has no usable id, skipping");
                report.errors += 1;
                continue;
            }

            let text = entry.narration_text();
            let hash = content_hash(&text);
            let changed = previous.get(&entry.id) != Some(&hash);

            if !changed && self.all_voices_present(&entry.id).await {
                tracing::debug!(id = %entry.id, "Content unchanged, skipping");
                report.unchanged += 1;
                hashes.insert(entry.id.clone(), hash);
                continue;
            }

            let mut failed = false;
            for &voice in &self.voices {
                match self.generate_one(&entry.id, &text, voice).await {
                    Ok(path) => {
                        tracing::info!(path = %path.display(), "Saved narration audio");
                        report.generated += 1;
                    }
                    Err(e) => {
                        tracing::error!(id = %entry.id, %voice, error = %e, "Failed to generate narration audio");
                        report.errors += 1;
                        failed = true;
                    }
                }
            }

            // A failed voice keeps the old hash so the next run retries
            if !failed {
                hashes.insert(entry.id.clone(), hash);
            } else if let Some(old) = previous.get(&entry.id) {
                hashes.insert(entry.id.clone(), old.clone());
            }
        }

        self.save_hashes(&hashes).await?;
        tracing::info!(
            generated = report.generated,
            unchanged = report.unchanged,
            errors = report.errors,
            "Generation complete"
        );
        Ok(report)
    }

    async fn generate_one(
        &self,
        entry_id: &str,
        text: &str,
        voice: Voice,
    ) -> Result<PathBuf, GenerateError> {
        let path = self
            .assets
            .path_for(entry_id, voice)
            .ok_or_else(|| GenerateError::UnusableId {
                id: entry_id.to_string(),
            })?;

        let audio = self.synth.synthesize(text, voice).await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(dir) = path.parent() {
            create_dir(dir).await?;
        }
        tokio::fs::write(&path, audio)
            .await
            .map_err(|source| GenerateError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

async fn create_dir(dir: &Path) -> Result<(), GenerateError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| GenerateError::Write {
            path: dir.to_path_buf(),
            source,
        })
}
