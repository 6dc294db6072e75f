use chronicle_types::{TimelineDocument, TimelineEntry};
use tokio::sync::Mutex;

use super::backend::{PersistenceBackend, load_or_initial};
use super::document::{prepare_entry, today, validate_document, validate_new_entry};
use super::error::TimelineError;

/// Credential-checked access to the timeline document.
///
/// Reads are open; every write requires the shared admin password.
/// Writes are serialized so a create never works from a stale document.
pub struct TimelineStore {
    backend: Box<dyn PersistenceBackend>,
    credential: String,
    write_lock: Mutex<()>,
}

impl TimelineStore {
    pub fn new(backend: Box<dyn PersistenceBackend>, credential: impl Into<String>) -> Self {
        Self {
            backend,
            credential: credential.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn authorize(&self, credential: &str) -> Result<(), TimelineError> {
        if credential.is_empty() || credential != self.credential {
            return Err(TimelineError::Auth);
        }
        Ok(())
    }

    /// Current document; an empty store yields the initial document
    pub async fn document(&self) -> Result<TimelineDocument, TimelineError> {
        load_or_initial(self.backend.as_ref()).await
    }

    /// Replace the whole document. Returns what was stored.
    pub async fn save(
        &self,
        mut document: TimelineDocument,
        credential: &str,
    ) -> Result<TimelineDocument, TimelineError> {
        self.authorize(credential)?;

        document.timeline = document.timeline.into_iter().map(prepare_entry).collect();
        validate_document(&document)?;
        document.metadata.last_updated = today();

        let _guard = self.write_lock.lock().await;
        self.backend.store(&document).await?;
        tracing::info!(
            backend = self.backend.name(),
            entries = document.timeline.len(),
            "Saved timeline"
        );
        Ok(document)
    }

    /// Add one entry. Returns the entry as stored, with generated defaults.
    pub async fn create_entry(
        &self,
        entry: TimelineEntry,
        credential: &str,
    ) -> Result<TimelineEntry, TimelineError> {
        self.authorize(credential)?;
        validate_new_entry(&entry)?;
        let entry = prepare_entry(entry);

        // Held from the conflict check until the insert lands
        let _guard = self.write_lock.lock().await;
        let document = self.document().await?;
        if let Some(existing) = document.entry(&entry.id) {
            return Err(TimelineError::Conflict {
                id: entry.id.clone(),
                existing: Box::new(existing.clone()),
            });
        }

        self.backend.insert_entry(&entry, today()).await?;
        tracing::info!(backend = self.backend.name(), id = %entry.id, "Created timeline entry");
        Ok(entry)
    }
}
