//! JSON file backend with optional git commit after each write

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chronicle_types::TimelineDocument;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::PersistenceBackend;
use crate::timeline::error::TimelineError;

/// Where committed timeline changes are pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSync {
    pub remote: String,
    pub branch: String,
}

/// Pretty-printed JSON document on the local filesystem.
///
/// Writes go to a sibling temp file and are renamed into place, so readers
/// never see a half-written document.
pub struct FileBackend {
    path: PathBuf,
    git: Option<GitSync>,
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            git: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_git(mut self, git: GitSync) -> Self {
        self.git = Some(git);
        self
    }

    async fn write_document(&self, document: &TimelineDocument) -> Result<(), TimelineError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TimelineError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let json = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| TimelineError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| TimelineError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }

    async fn commit(&self, git: &GitSync) -> Result<(), String> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .ok_or_else(|| format!("{} has no file name", self.path.display()))?;
        let message = format!(
            "Update timeline data - {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ")
        );

        run_git(dir, &["add", &file]).await?;
        run_git(dir, &["commit", "-m", &message]).await?;
        run_git(dir, &["push", &git.remote, &git.branch]).await?;
        Ok(())
    }
}

async fn run_git(dir: &Path, args: &[&str]) -> Result<(), String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to run git {}: {}", args[0], e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "git {} exited with {}: {}",
            args[0],
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<TimelineDocument, TimelineError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "Timeline file not found, creating default");
                let document = TimelineDocument::default();
                self.write_document(&document).await?;
                Ok(document)
            }
            Err(source) => Err(TimelineError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn store(&self, document: &TimelineDocument) -> Result<(), TimelineError> {
        self.write_document(document).await?;
        tracing::debug!(
            path = %self.path.display(),
            entries = document.timeline.len(),
            "Wrote timeline file"
        );

        if let Some(git) = &self.git {
            match self.commit(git).await {
                Ok(()) => tracing::info!(remote = %git.remote, branch = %git.branch, "Committed timeline changes"),
                Err(e) => tracing::warn!(error = %e, "Failed to commit timeline changes"),
            }
        }
        Ok(())
    }
}
