pub mod reconcile;
pub mod walk;

use crate::config::{AppConfig, IgnorePolicy};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::Database;
use crate::tagger::AutoTagger;
use reconcile::Reconciler;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;
use walk::Traversal;

pub use walk::{EmitPhase, EntryRecord, EntrySink};

/// Substring filters applied to every child before it is visited.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    policy: IgnorePolicy,
}

impl IgnoreRules {
    pub fn new(patterns: Vec<String>, policy: IgnorePolicy) -> Self {
        Self {
            patterns: patterns.into_iter().filter(|p| !p.is_empty()).collect(),
            policy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ignore_patterns.clone(), config.ignore_policy)
    }

    pub fn is_ignored(&self, name: &str, full_path: &str) -> bool {
        let haystack = match self.policy {
            IgnorePolicy::Name => name,
            IgnorePolicy::Path => full_path,
        };
        self.patterns.iter().any(|p| haystack.contains(p.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    pub root: String,
    pub folders: usize,
    pub files: usize,
    pub links: usize,
    pub bytes: u64,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub errors: usize,
    pub duration: Duration,
}

/// Crawls one root at a time into the entry store.
pub struct Walker<'a> {
    db: &'a Database,
    tagger: &'a AutoTagger,
    ignore: IgnoreRules,
}

impl<'a> Walker<'a> {
    pub fn new(db: &'a Database, tagger: &'a AutoTagger, ignore: IgnoreRules) -> Self {
        Self { db, tagger, ignore }
    }

    /// One full pass over `root`: emit every node, then drop stale rows.
    pub fn scan_root(
        &self,
        root: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<WalkReport, Error> {
        if !root.is_absolute() {
            return Err(Error::RelativePath(root.display().to_string()));
        }
        if !fs::metadata(root)?.is_dir() {
            return Err(Error::Other(format!(
                "scan root {} is not a directory",
                root.display()
            )));
        }

        let root_str = walk::path_string(root);
        reporter.on_walk_start(&root_str);
        let started = Instant::now();

        let mut reconciler = Reconciler::load(self.db, self.tagger, root)?;
        let (bytes, counts) = {
            let mut traversal = Traversal::new(&mut reconciler, &self.ignore, reporter);
            let bytes = traversal.visit_root(root);
            (bytes, traversal.counts())
        };
        let deleted = reconciler.remove_stale()?;
        let reconciled = reconciler.counts();

        let report = WalkReport {
            root: root_str,
            folders: counts.folders,
            files: counts.files,
            links: counts.links,
            bytes,
            created: reconciled.created,
            updated: reconciled.updated,
            unchanged: reconciled.unchanged,
            deleted,
            errors: counts.errors,
            duration: started.elapsed(),
        };
        reporter.on_walk_complete(
            &report.root,
            report.folders + report.files + report.links,
            report.duration.as_secs_f64(),
        );
        info!(
            "Walked {} in {:.2}s: {} folders, {} files, {} links ({} bytes); \
             {} created, {} updated, {} unchanged, {} deleted, {} errors",
            report.root,
            report.duration.as_secs_f64(),
            report.folders,
            report.files,
            report.links,
            report.bytes,
            report.created,
            report.updated,
            report.unchanged,
            report.deleted,
            report.errors,
        );
        Ok(report)
    }
}
