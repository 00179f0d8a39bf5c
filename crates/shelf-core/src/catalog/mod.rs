//! Derived media catalogs layered on the entry store.

pub mod audio;
pub mod palette;
pub mod video;

use crate::error::Error;
use crate::storage::models::{CorruptionSet, Entry};
use crate::storage::Database;
use tracing::debug;

pub use audio::AudioCatalog;
pub use video::VideoCatalog;

/// Per-pass counters for one catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    /// Files whose mime type belongs to the catalog.
    pub seen: usize,
    /// Already cataloged, or content already known to be corrupted.
    pub skipped: usize,
    /// Newly marked corrupted this pass.
    pub corrupted: usize,
    /// Dropped by the completeness gate.
    pub rejected: usize,
    pub inserted: usize,
    /// Unreadable files and store errors.
    pub failed: usize,
    /// Rows removed because their entry left the store.
    pub pruned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Present,
    KnownCorrupt,
    Corrupted,
    Rejected,
    Inserted,
    Unreadable,
}

impl CatalogStats {
    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Present | Outcome::KnownCorrupt => self.skipped += 1,
            Outcome::Corrupted => self.corrupted += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Inserted => self.inserted += 1,
            Outcome::Unreadable => self.failed += 1,
        }
    }
}

pub(crate) fn has_mime_class(entry: &Entry, class: &str) -> bool {
    entry
        .mime_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with(class))
}

/// Records the content hash in the catalog's corrupted set.
pub(crate) fn mark_corrupted(
    db: &Database,
    set: CorruptionSet,
    hash: &str,
    entry: &Entry,
    reason: &str,
) -> Result<Outcome, Error> {
    debug!("Marking {} as corrupted: {}", entry.path, reason);
    db.mark_corrupted(set, hash, &entry.path)?;
    Ok(Outcome::Corrupted)
}
