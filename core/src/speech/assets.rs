//! Pre-generated narration audio at `{root}/{voice}/{entry_id}.{ext}`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chronicle_types::{SpeechSettings, Voice};
use reqwest::Client;

use super::error::SpeechError;

#[async_trait]
pub trait StaticAssets: Send + Sync {
    /// `Ok(None)` when no asset exists for this entry and voice
    async fn fetch(&self, entry_id: &str, voice: Voice) -> Result<Option<Vec<u8>>, SpeechError>;
}

/// Path of an asset relative to the asset root
pub fn asset_path(entry_id: &str, voice: Voice, extension: &str) -> String {
    format!("{}/{}.{}", voice, entry_id, extension)
}

/// Entry ids are used as file names; anything that could leave the voice
/// directory is rejected.
pub fn is_safe_entry_id(entry_id: &str) -> bool {
    !entry_id.is_empty()
        && !entry_id.contains(['/', '\\'])
        && !entry_id.contains("..")
}

/// Pick the asset source for the configured root: an `http(s)://` base URL
/// or a local directory.
pub fn static_assets(settings: &SpeechSettings) -> Result<Arc<dyn StaticAssets>, SpeechError> {
    let root = settings.asset_root.trim();
    if root.is_empty() {
        return Ok(Arc::new(NoAssets));
    }
    if root.starts_with("http://") || root.starts_with("https://") {
        let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));
        Ok(Arc::new(HttpAssets::new(
            root,
            &settings.asset_extension,
            timeout,
        )?))
    } else {
        Ok(Arc::new(DirAssets::new(root, &settings.asset_extension)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────────────────────────────────────

pub struct DirAssets {
    root: PathBuf,
    extension: String,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// File backing (entry, voice), or `None` for an unsafe id
    pub fn path_for(&self, entry_id: &str, voice: Voice) -> Option<PathBuf> {
        is_safe_entry_id(entry_id).then(|| {
            self.root
                .join(voice.as_str())
                .join(format!("{}.{}", entry_id, self.extension))
        })
    }
}

#[async_trait]
impl StaticAssets for DirAssets {
    async fn fetch(&self, entry_id: &str, voice: Voice) -> Result<Option<Vec<u8>>, SpeechError> {
        let Some(path) = self.path_for(entry_id, voice) else {
            tracing::debug!(entry_id, "Refusing asset lookup for unsafe id");
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(audio) => Ok(Some(audio)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SpeechError::Asset { path, source }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpAssets {
    client: Client,
    base_url: String,
    extension: String,
}

impl HttpAssets {
    pub fn new(base_url: &str, extension: &str, timeout: Duration) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SpeechError::Request)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            extension: extension.to_string(),
        })
    }
}

#[async_trait]
impl StaticAssets for HttpAssets {
    async fn fetch(&self, entry_id: &str, voice: Voice) -> Result<Option<Vec<u8>>, SpeechError> {
        if !is_safe_entry_id(entry_id) {
            return Ok(None);
        }
        let url = format!(
            "{}/{}",
            self.base_url,
            asset_path(entry_id, voice, &self.extension)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(SpeechError::Request)?;

        // Any non-success answer just means "no pre-generated file"
        if !response.status().is_success() {
            tracing::debug!(%url, status = response.status().as_u16(), "No static asset");
            return Ok(None);
        }
        let audio = response.bytes().await.map_err(SpeechError::Request)?;
        Ok(Some(audio.to_vec()))
    }
}

/// Used when no asset root is configured
pub struct NoAssets;

#[async_trait]
impl StaticAssets for NoAssets {
    async fn fetch(&self, _entry_id: &str, _voice: Voice) -> Result<Option<Vec<u8>>, SpeechError> {
        Ok(None)
    }
}
