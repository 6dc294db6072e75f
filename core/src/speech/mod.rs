//! Narration audio: cache, static assets, synthesis and the resolver that
//! chains them

mod assets;
mod cache;
mod error;
mod source;
mod synth;

pub use assets::{
    DirAssets, HttpAssets, NoAssets, StaticAssets, asset_path, is_safe_entry_id, static_assets,
};
pub use cache::{
    AudioCache, CacheBounds, DiskAudioCache, MemoryAudioCache, NoCache, cache_key,
    open_audio_cache,
};
pub use error::{CacheError, SpeechError};
pub use source::{AudioOrigin, ResolvedAudio, SpeechRequest, SpeechSource};
pub use synth::{OpenAiSynthesizer, ProxySynthesizer, Synthesizer, Unconfigured, synthesizer};
