//! Storage backends for the timeline document
//!
//! Every backend stores the same [`TimelineDocument`]; which one is used is
//! decided by [`StorageSettings::backend`].

mod blob;
mod file;
mod table;

pub use blob::BlobBackend;
pub use file::{FileBackend, GitSync};
pub use table::TableBackend;

use async_trait::async_trait;
use chrono::NaiveDate;
use chronicle_types::{BackendKind, StorageSettings, TimelineDocument, TimelineEntry};

use super::error::TimelineError;

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read the stored document. A backend with nothing stored yet either
    /// returns the initial document or [`TimelineError::NotFound`].
    async fn load(&self) -> Result<TimelineDocument, TimelineError>;

    /// Replace the stored document
    async fn store(&self, document: &TimelineDocument) -> Result<(), TimelineError>;

    /// Append one entry and set `lastUpdated`.
    ///
    /// The caller has already checked for an existing id; backends that can
    /// detect the clash atomically still report it as a conflict.
    async fn insert_entry(
        &self,
        entry: &TimelineEntry,
        updated: NaiveDate,
    ) -> Result<(), TimelineError> {
        let mut document = load_or_initial(self).await?;
        if let Some(existing) = document.entry(&entry.id) {
            return Err(TimelineError::Conflict {
                id: entry.id.clone(),
                existing: Box::new(existing.clone()),
            });
        }
        document.timeline.push(entry.clone());
        document.metadata.last_updated = updated;
        self.store(&document).await
    }
}

/// Load, treating "nothing stored yet" as the initial document
pub async fn load_or_initial<B: PersistenceBackend + ?Sized>(
    backend: &B,
) -> Result<TimelineDocument, TimelineError> {
    match backend.load().await {
        Err(TimelineError::NotFound) => {
            tracing::info!(backend = backend.name(), "No stored timeline, starting empty");
            Ok(TimelineDocument::default())
        }
        other => other,
    }
}

/// Build the backend selected in the storage settings
pub fn open_backend(
    settings: &StorageSettings,
) -> Result<Box<dyn PersistenceBackend>, TimelineError> {
    let backend: Box<dyn PersistenceBackend> = match settings.backend {
        BackendKind::File => {
            let mut backend = FileBackend::new(&settings.timeline_file);
            if settings.commit_changes {
                backend = backend.with_git(GitSync {
                    remote: settings.git_remote.clone(),
                    branch: settings.git_branch.clone(),
                });
            }
            Box::new(backend)
        }
        BackendKind::Blob => {
            if settings.blob_url.trim().is_empty() {
                return Err(TimelineError::Misconfigured {
                    reason: "blob backend selected but storage.blob_url is empty".to_string(),
                });
            }
            Box::new(BlobBackend::new(
                &settings.blob_url,
                &settings.blob_namespace,
                &settings.blob_key,
                &settings.blob_token,
            )?)
        }
        BackendKind::Table => Box::new(TableBackend::open(&settings.table_path)?),
    };

    tracing::debug!(backend = backend.name(), "Opened timeline backend");
    Ok(backend)
}
