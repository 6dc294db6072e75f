use std::sync::Arc;

use chronicle_types::{TimelineEntry, Voice};

use super::assets::StaticAssets;
use super::cache::AudioCache;
use super::error::SpeechError;
use super::synth::Synthesizer;

/// What to narrate: the entry id addresses static assets, the text addresses
/// the cache and the synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub entry_id: String,
    pub text: String,
    pub voice: Voice,
}

impl SpeechRequest {
    pub fn for_entry(entry: &TimelineEntry, voice: Voice) -> Self {
        Self {
            entry_id: entry.id.clone(),
            text: entry.narration_text(),
            voice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOrigin {
    Cache,
    StaticAsset,
    Synthesized,
}

#[derive(Debug, Clone)]
pub struct ResolvedAudio {
    pub audio: Vec<u8>,
    pub origin: AudioOrigin,
}

/// Resolves narration audio: cache, then static asset, then synthesis.
/// Audio found past the cache is written back to it.
#[derive(Clone)]
pub struct SpeechSource {
    cache: Arc<dyn AudioCache>,
    assets: Arc<dyn StaticAssets>,
    synth: Arc<dyn Synthesizer>,
}

impl SpeechSource {
    pub fn new(
        cache: Arc<dyn AudioCache>,
        assets: Arc<dyn StaticAssets>,
        synth: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            cache,
            assets,
            synth,
        }
    }

    pub async fn resolve(&self, request: &SpeechRequest) -> Result<ResolvedAudio, SpeechError> {
        let SpeechRequest {
            entry_id,
            text,
            voice,
        } = request;

        match self.cache.get(text, *voice).await {
            Ok(Some(audio)) => {
                tracing::debug!(entry_id = %entry_id, %voice, "Audio cache hit");
                return Ok(ResolvedAudio {
                    audio,
                    origin: AudioOrigin::Cache,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, entry_id = %entry_id, "Audio cache lookup failed"),
        }

        match self.assets.fetch(entry_id, *voice).await {
            Ok(Some(audio)) => {
                tracing::debug!(entry_id = %entry_id, %voice, "Using static audio asset");
                self.remember(request, &audio).await;
                return Ok(ResolvedAudio {
                    audio,
                    origin: AudioOrigin::StaticAsset,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, entry_id = %entry_id, "Static audio lookup failed"),
        }

        let audio = self.synth.synthesize(text, *voice).await?;
        tracing::debug!(entry_id = %entry_id, %voice, bytes = audio.len(), "Synthesized narration");
        self.remember(request, &audio).await;
        Ok(ResolvedAudio {
            audio,
            origin: AudioOrigin::Synthesized,
        })
    }

    async fn remember(&self, request: &SpeechRequest, audio: &[u8]) {
        if let Err(e) = self.cache.put(&request.text, request.voice, audio).await {
            tracing::warn!(error = %e, entry_id = %request.entry_id, "Failed to cache narration audio");
        }
    }
}
