use super::walk::{EmitPhase, EntryRecord, EntrySink};
use crate::error::Error;
use crate::storage::models::Entry;
use crate::storage::Database;
use crate::tagger::AutoTagger;
use ahash::{AHashMap, AHashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Applies walker records to the store: creates unknown paths (with
/// auto-tags), updates rows whose walker-owned columns changed, and
/// afterwards removes rows that vanished from disk.
pub(crate) struct Reconciler<'a> {
    db: &'a Database,
    tagger: &'a AutoTagger,
    known: AHashMap<String, Entry>,
    emitted: AHashSet<String>,
    fresh: AHashSet<String>,
    changed: AHashSet<String>,
    counts: ReconcileCounts,
}

impl<'a> Reconciler<'a> {
    /// Loads every stored entry at or below `root`.
    pub(crate) fn load(
        db: &'a Database,
        tagger: &'a AutoTagger,
        root: &Path,
    ) -> Result<Self, Error> {
        let prefix = root.to_string_lossy();
        let known: AHashMap<String, Entry> = db
            .list_by_path_prefix(&prefix)?
            .into_iter()
            .filter(|e| Path::new(&e.path).starts_with(root))
            .map(|e| (e.path.clone(), e))
            .collect();
        debug!("{} known entries under {}", known.len(), root.display());

        Ok(Self {
            db,
            tagger,
            known,
            emitted: AHashSet::new(),
            fresh: AHashSet::new(),
            changed: AHashSet::new(),
            counts: ReconcileCounts::default(),
        })
    }

    pub(crate) fn counts(&self) -> ReconcileCounts {
        self.counts
    }

    fn apply(&mut self, record: &EntryRecord, phase: EmitPhase) -> Result<(), Error> {
        let Some(existing) = self.known.get(&record.path) else {
            let tags = self
                .tagger
                .tags_for(&record.path, record.mime_type.as_deref());
            let entry = record.clone().into_entry(tags);
            self.db.create_entry(&entry)?;
            self.counts.created += 1;
            self.fresh.insert(record.path.clone());
            self.known.insert(record.path.clone(), entry);
            return Ok(());
        };

        let mut next = existing.clone();
        record.apply_to(&mut next);
        if phase == EmitPhase::Open {
            // The size is only known on close; keep what is stored.
            next.size = existing.size;
        }

        if next != *existing {
            self.db.update_entry(&next)?;
            self.changed.insert(record.path.clone());
            self.known.insert(record.path.clone(), next);
        }

        if phase == EmitPhase::Close && !self.fresh.contains(&record.path) {
            if self.changed.contains(&record.path) {
                self.counts.updated += 1;
            } else {
                self.counts.unchanged += 1;
            }
        }
        Ok(())
    }

    /// Deletes rows under the root that were not emitted this pass and are
    /// gone from disk. Rows whose node exists or cannot be checked stay.
    pub(crate) fn remove_stale(&mut self) -> Result<usize, Error> {
        let mut stale: Vec<(String, String)> = self
            .known
            .values()
            .filter(|e| !self.emitted.contains(&e.path))
            .map(|e| (e.path.clone(), e.id.clone()))
            .collect();
        stale.sort();

        let mut deleted = 0;
        for (path, id) in stale {
            match fs::symlink_metadata(&path) {
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Ok(_) => {
                    debug!("Not seen this pass but still on disk, keeping {}", path);
                    continue;
                }
                Err(e) => {
                    debug!("Cannot check {} ({}), keeping it", path, e);
                    continue;
                }
            }
            if self.db.delete_entry(&id)? {
                debug!("Removed stale entry {}", path);
                deleted += 1;
            }
            self.known.remove(&path);
        }
        Ok(deleted)
    }
}

impl EntrySink for Reconciler<'_> {
    fn id_for(&mut self, path: &str) -> String {
        match self.known.get(path) {
            Some(entry) => entry.id.clone(),
            None => Uuid::new_v4().to_string(),
        }
    }

    fn known_size(&self, path: &str) -> Option<u64> {
        self.known.get(path).and_then(|entry| entry.size)
    }

    fn emit(&mut self, record: &EntryRecord, phase: EmitPhase) -> bool {
        self.emitted.insert(record.path.clone());
        match self.apply(record, phase) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not store {}: {}", record.path, e);
                self.counts.failed += 1;
                false
            }
        }
    }
}
