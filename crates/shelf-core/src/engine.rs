use crate::catalog::{AudioCatalog, CatalogStats, VideoCatalog};
use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::probe::MediaProber;
use crate::progress::ProgressReporter;
use crate::scanner::{IgnoreRules, WalkReport, Walker};
use crate::storage::Database;
use crate::tagger::AutoTagger;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Owns everything a pass needs apart from the database handle.
pub struct ScanEngine<P: MediaProber> {
    config: AppConfig,
    tagger: AutoTagger,
    prober: P,
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub walks: Vec<WalkReport>,
    pub failed_roots: Vec<String>,
    /// Catalogs whose pass stopped on a store error.
    pub failed_catalogs: Vec<String>,
    pub video: CatalogStats,
    pub audio: CatalogStats,
    pub duration: Duration,
}

impl<P: MediaProber> ScanEngine<P> {
    /// Loads the auto-tag rule file named in the config, if any.
    pub fn new(config: AppConfig, prober: P) -> Result<Self, Error> {
        let tagger = match &config.auto_tag_rules {
            Some(path) => AutoTagger::from_file(Path::new(path))?,
            None => AutoTagger::empty(),
        };
        Ok(Self {
            config,
            tagger,
            prober,
        })
    }

    pub fn with_tagger(mut self, tagger: AutoTagger) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Canonical roots with nested ones removed. Roots that cannot be
    /// resolved are returned separately.
    pub fn resolve_roots(&self) -> (Vec<PathBuf>, Vec<String>) {
        let mut resolved = Vec::new();
        let mut failed = Vec::new();
        for root in &self.config.root_paths {
            match fs::canonicalize(root) {
                Ok(path) => resolved.push(path.to_string_lossy().into_owned()),
                Err(e) => {
                    warn!("Cannot resolve root {}: {}", root, e);
                    failed.push(root.clone());
                }
            }
        }
        let roots = config::non_overlapping_directories(resolved)
            .into_iter()
            .map(PathBuf::from)
            .collect();
        (roots, failed)
    }

    /// Walker over every root, then the video pass, then the audio pass.
    pub fn run_pass(
        &self,
        db: &Database,
        reporter: &dyn ProgressReporter,
    ) -> Result<PassReport, Error> {
        let started = Instant::now();
        let (roots, mut failed_roots) = self.resolve_roots();
        info!("Processing roots: {:?}", roots);

        let walker = Walker::new(db, &self.tagger, IgnoreRules::from_config(&self.config));
        let mut walks = Vec::with_capacity(roots.len());
        for root in &roots {
            match walker.scan_root(root, reporter) {
                Ok(report) => walks.push(report),
                Err(e) => {
                    error!("Walk of {} failed: {}", root.display(), e);
                    failed_roots.push(root.to_string_lossy().into_owned());
                }
            }
        }

        let mut failed_catalogs = Vec::new();
        let video = VideoCatalog::new(db, &self.prober, self.config.frame_count)
            .run_pass(reporter)
            .unwrap_or_else(|e| {
                error!("Video catalog pass failed: {}", e);
                failed_catalogs.push("video".to_string());
                CatalogStats::default()
            });
        let audio = AudioCatalog::new(db, &self.prober)
            .run_pass(reporter)
            .unwrap_or_else(|e| {
                error!("Audio catalog pass failed: {}", e);
                failed_catalogs.push("audio".to_string());
                CatalogStats::default()
            });

        let report = PassReport {
            walks,
            failed_roots,
            failed_catalogs,
            video,
            audio,
            duration: started.elapsed(),
        };
        info!(
            "Pass finished in {:.2}s: {} roots walked, {} failed, {} videos and {} tracks added",
            report.duration.as_secs_f64(),
            report.walks.len(),
            report.failed_roots.len(),
            report.video.inserted,
            report.audio.inserted,
        );
        Ok(report)
    }

    /// Runs passes back to back with the configured sleep in between.
    /// A failing pass is logged; the loop never exits.
    pub fn run_forever(&self, db: &Database, reporter: &dyn ProgressReporter) -> ! {
        let interval = self.config.rescan_interval();
        loop {
            if let Err(e) = self.run_pass(db, reporter) {
                error!("Pass failed: {}", e);
            }
            info!("Sleeping {}s until the next pass", interval.as_secs());
            thread::sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AudioProbe, FrameKind, ProbeError, VideoProbe};

    struct NoTools;

    impl MediaProber for NoTools {
        fn has_video_stream(&self, _: &Path) -> Result<bool, ProbeError> {
            Ok(false)
        }
        fn probe_video(&self, _: &Path) -> Result<VideoProbe, ProbeError> {
            Err(ProbeError::Missing("unused".into()))
        }
        fn extract_frame(&self, _: &Path, _: f64, _: FrameKind) -> Result<Vec<u8>, ProbeError> {
            Err(ProbeError::Missing("unused".into()))
        }
        fn probe_audio(&self, _: &Path) -> Result<AudioProbe, ProbeError> {
            Err(ProbeError::Missing("unused".into()))
        }
        fn extract_cover_art(&self, _: &Path) -> Result<Option<Vec<u8>>, ProbeError> {
            Ok(None)
        }
    }

    #[test]
    fn nested_and_missing_roots_are_resolved() {
        let tmp = tempfile::TempDir::new().unwrap();
        let outer = tmp.path().join("outer");
        let inner = outer.join("inner");
        fs::create_dir_all(&inner).unwrap();

        let config = AppConfig {
            root_paths: vec![
                inner.to_string_lossy().into_owned(),
                outer.to_string_lossy().into_owned(),
                tmp.path().join("missing").to_string_lossy().into_owned(),
            ],
            ..Default::default()
        };
        let engine = ScanEngine::new(config, NoTools).unwrap();
        let (roots, failed) = engine.resolve_roots();
        assert_eq!(roots, vec![fs::canonicalize(&outer).unwrap()]);
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn missing_rule_file_is_an_error() {
        let config = AppConfig {
            auto_tag_rules: Some("/definitely/not/here.rules".into()),
            ..Default::default()
        };
        assert!(ScanEngine::new(config, NoTools).is_err());
    }
}
