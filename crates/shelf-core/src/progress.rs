/// Trait for reporting pass progress.
///
/// The CLI implements it with indicatif bars; the scheduler runs silently.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_walk_start(&self, _root: &str) {}
    fn on_walk_progress(&self, _nodes_seen: usize, _current_path: &str) {}
    fn on_walk_complete(&self, _root: &str, _nodes_seen: usize, _duration_secs: f64) {}
    fn on_catalog_start(&self, _catalog: &str, _candidates: usize) {}
    fn on_catalog_progress(&self, _catalog: &str, _processed: usize, _candidates: usize) {}
    fn on_catalog_complete(&self, _catalog: &str, _inserted: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
