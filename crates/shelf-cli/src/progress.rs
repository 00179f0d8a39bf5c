use indicatif::{ProgressBar, ProgressStyle};
use shelf_core::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Walk phase: spinner per root (node count unknown upfront)
/// - Catalog phases: progress bar over the candidate files
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICKS)
}

fn bar_style(catalog: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} files ({{eta}} remaining)",
        catalog
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
    .tick_chars(TICKS)
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_walk_start(&self, root: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message(format!("Walking {}...", root));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_walk_progress(&self, nodes_seen: usize, _current_path: &str) {
        self.with_bar(|pb| pb.set_message(format!("Walking... {} nodes seen", nodes_seen)));
    }

    fn on_walk_complete(&self, root: &str, nodes_seen: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Walked {}: {} nodes in {:.2}s",
            root, nodes_seen, duration_secs
        );
    }

    fn on_catalog_start(&self, catalog: &str, candidates: usize) {
        let pb = ProgressBar::new(candidates as u64);
        pb.set_style(bar_style(catalog));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_catalog_progress(&self, _catalog: &str, processed: usize, _candidates: usize) {
        self.with_bar(|pb| pb.set_position(processed as u64));
    }

    fn on_catalog_complete(&self, catalog: &str, inserted: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} catalog: {} new in {:.2}s",
            catalog, inserted, duration_secs
        );
    }
}
