//! Timeline document rules and persistence
//!
//! - **document**: id generation, entry defaults, validation, display order
//! - **backend**: the `PersistenceBackend` contract and its file, blob and
//!   table implementations
//! - **store**: credential-checked get/save/create on top of a backend

pub mod backend;
mod document;
mod error;
mod store;

pub use backend::{
    BlobBackend, FileBackend, GitSync, PersistenceBackend, TableBackend, load_or_initial,
    open_backend,
};
pub use document::{
    entry_id, prepare_entry, slugify, sorted_entries, today, validate_document, validate_new_entry,
};
pub use error::TimelineError;
pub use store::TimelineStore;
