//! Persistent audio cache keyed by voice and exact narration text

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chronicle_types::Voice;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::error::CacheError;

/// Cache key: voice, underscore, then the narration text byte for byte
pub fn cache_key(text: &str, voice: Voice) -> String {
    format!("{}_{}", voice, text)
}

/// Limits applied by cache implementations. Zero / `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheBounds {
    pub max_entries: usize,
    pub max_age: Option<Duration>,
}

#[async_trait]
pub trait AudioCache: Send + Sync {
    async fn get(&self, text: &str, voice: Voice) -> Result<Option<Vec<u8>>, CacheError>;
    async fn put(&self, text: &str, voice: Voice, audio: &[u8]) -> Result<(), CacheError>;
}

/// Open the disk cache, or fall back to [`NoCache`] when the directory is
/// unusable. Narration keeps working either way.
pub async fn open_audio_cache(dir: &Path, bounds: CacheBounds) -> Arc<dyn AudioCache> {
    match DiskAudioCache::open(dir, bounds).await {
        Ok(cache) => {
            tracing::debug!(dir = %dir.display(), "Audio cache ready");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!(error = %e, dir = %dir.display(), "Audio cache disabled");
            Arc::new(NoCache)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disk Cache
// ─────────────────────────────────────────────────────────────────────────────

const AUDIO_EXT: &str = "audio";
const META_EXT: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct RecordMeta {
    key: String,
    /// Unix milliseconds, strictly increasing within one process
    created_at: i64,
    size: u64,
}

/// One `<sha256>.audio` + `<sha256>.json` pair per record.
///
/// The metadata file is written last, so a record only becomes visible once
/// its audio is complete. Writers use private temp files and publish the pair
/// under `write_lock`, so racing puts for one key never mix audio and metadata.
pub struct DiskAudioCache {
    dir: PathBuf,
    bounds: CacheBounds,
    last_stamp: AtomicI64,
    write_lock: Mutex<()>,
    prune_lock: Mutex<()>,
}

impl DiskAudioCache {
    pub async fn open(dir: impl Into<PathBuf>, bounds: CacheBounds) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir,
            bounds,
            last_stamp: AtomicI64::new(0),
            write_lock: Mutex::new(()),
            prune_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, key: &str, ext: &str) -> PathBuf {
        let stem = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.dir.join(stem).with_extension(ext)
    }

    fn stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }

    fn is_expired(&self, meta: &RecordMeta) -> bool {
        let Some(max_age) = self.bounds.max_age else {
            return false;
        };
        let age_ms = chrono::Utc::now().timestamp_millis() - meta.created_at;
        age_ms > i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX)
    }

    async fn remove_record(&self, meta_path: &Path) {
        let _ = tokio::fs::remove_file(meta_path).await;
        let _ = tokio::fs::remove_file(meta_path.with_extension(AUDIO_EXT)).await;
    }

    async fn read_meta(&self, path: &Path) -> Result<Option<RecordMeta>, CacheError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Evict oldest records until at most `max_entries` remain
    async fn prune(&self) -> Result<(), CacheError> {
        if self.bounds.max_entries == 0 {
            return Ok(());
        }
        let _guard = self.prune_lock.lock().await;

        let io_err = |source| CacheError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        while let Some(item) = dir.next_entry().await.map_err(io_err)? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            match self.read_meta(&path).await {
                Ok(Some(meta)) => records.push((meta.created_at, path)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping unreadable cache record");
                    self.remove_record(&path).await;
                }
            }
        }

        if records.len() <= self.bounds.max_entries {
            return Ok(());
        }
        records.sort();
        let excess = records.len() - self.bounds.max_entries;
        for (_, path) in records.into_iter().take(excess) {
            self.remove_record(&path).await;
        }
        tracing::debug!(evicted = excess, "Pruned audio cache");
        Ok(())
    }
}

/// Temp name unique to this process and this put
fn temp_path(path: &Path, stamp: i64) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}-{}.tmp", std::process::id(), stamp));
    PathBuf::from(tmp)
}

async fn write_temp(tmp: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    tokio::fs::write(tmp, bytes)
        .await
        .map_err(|source| CacheError::Io {
            path: tmp.to_path_buf(),
            source,
        })
}

async fn publish(tmp: &Path, path: &Path) -> Result<(), CacheError> {
    tokio::fs::rename(tmp, path)
        .await
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl AudioCache for DiskAudioCache {
    async fn get(&self, text: &str, voice: Voice) -> Result<Option<Vec<u8>>, CacheError> {
        let key = cache_key(text, voice);
        let meta_path = self.record_path(&key, META_EXT);

        let meta = match self.read_meta(&meta_path).await {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.remove_record(&meta_path).await;
                return Err(e);
            }
        };
        if meta.key != key {
            return Ok(None);
        }
        if self.is_expired(&meta) {
            tracing::debug!(voice = %voice, "Cached audio expired");
            self.remove_record(&meta_path).await;
            return Ok(None);
        }

        let audio_path = meta_path.with_extension(AUDIO_EXT);
        let audio = match tokio::fs::read(&audio_path).await {
            Ok(audio) => audio,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.remove_record(&meta_path).await;
                return Ok(None);
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: audio_path,
                    source,
                });
            }
        };
        if audio.len() as u64 != meta.size {
            self.remove_record(&meta_path).await;
            return Err(CacheError::Corrupt {
                path: audio_path,
                reason: format!("expected {} bytes, found {}", meta.size, audio.len()),
            });
        }
        Ok(Some(audio))
    }

    async fn put(&self, text: &str, voice: Voice, audio: &[u8]) -> Result<(), CacheError> {
        let key = cache_key(text, voice);
        let meta_path = self.record_path(&key, META_EXT);
        let meta = RecordMeta {
            key,
            created_at: self.stamp(),
            size: audio.len() as u64,
        };
        let meta_json = serde_json::to_vec(&meta).map_err(|e| CacheError::Corrupt {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;

        let audio_path = meta_path.with_extension(AUDIO_EXT);
        let audio_tmp = temp_path(&audio_path, meta.created_at);
        let meta_tmp = temp_path(&meta_path, meta.created_at);
        let written = async {
            write_temp(&audio_tmp, audio).await?;
            write_temp(&meta_tmp, &meta_json).await?;
            let _guard = self.write_lock.lock().await;
            publish(&audio_tmp, &audio_path).await?;
            publish(&meta_tmp, &meta_path).await
        }
        .await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&audio_tmp).await;
            let _ = tokio::fs::remove_file(&meta_tmp).await;
        }
        written?;

        self.prune().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Cache
// ─────────────────────────────────────────────────────────────────────────────

struct MemoryRecord {
    audio: Vec<u8>,
    created: Instant,
    seq: u64,
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, MemoryRecord>,
    next_seq: u64,
}

/// In-process cache with the same contract and bounds as the disk cache
#[derive(Default)]
pub struct MemoryAudioCache {
    bounds: CacheBounds,
    state: Mutex<MemoryState>,
}

impl MemoryAudioCache {
    pub fn new(bounds: CacheBounds) -> Self {
        Self {
            bounds,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AudioCache for MemoryAudioCache {
    async fn get(&self, text: &str, voice: Voice) -> Result<Option<Vec<u8>>, CacheError> {
        let key = cache_key(text, voice);
        let mut state = self.state.lock().await;

        let expired = match (state.records.get(&key), self.bounds.max_age) {
            (None, _) => return Ok(None),
            (Some(record), Some(max_age)) => record.created.elapsed() > max_age,
            (Some(_), None) => false,
        };
        if expired {
            state.records.remove(&key);
            return Ok(None);
        }
        Ok(state.records.get(&key).map(|r| r.audio.clone()))
    }

    async fn put(&self, text: &str, voice: Voice, audio: &[u8]) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.records.insert(
            cache_key(text, voice),
            MemoryRecord {
                audio: audio.to_vec(),
                created: Instant::now(),
                seq,
            },
        );

        let max = self.bounds.max_entries;
        while max > 0 && state.records.len() > max {
            let oldest = state
                .records
                .iter()
                .min_by_key(|(_, r)| r.seq)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => state.records.remove(&key),
                None => break,
            };
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disabled Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Always misses and silently accepts writes
pub struct NoCache;

#[async_trait]
impl AudioCache for NoCache {
    async fn get(&self, _text: &str, _voice: Voice) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _text: &str, _voice: Voice, _audio: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }
}
