use super::palette::{evenly_spaced, sample_count, sample_palette};
use super::{has_mime_class, mark_corrupted, CatalogStats, Outcome};
use crate::error::Error;
use crate::hasher::content_hash;
use crate::probe::{FrameKind, MediaProber, VideoProbe};
use crate::progress::ProgressReporter;
use crate::storage::models::{CorruptionSet, Entry, VideoColorPalette, VideoFrame, VideoMedia};
use crate::storage::Database;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const CATALOG: &str = "video";
/// Thumbnail position as a fraction of the duration.
const THUMBNAIL_AT: f64 = 0.1;

pub fn quality_label(height: u32) -> &'static str {
    match height {
        h if h >= 2160 => "4K",
        h if h >= 1440 => "1440p",
        h if h >= 1080 => "1080p",
        h if h >= 720 => "720p",
        h if h >= 480 => "480p",
        _ => "SD",
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// The probe's display aspect ratio, or `width:height` reduced.
pub fn aspect_ratio(display: Option<&str>, width: u32, height: u32) -> String {
    if let Some(dar) = display {
        return dar.to_string();
    }
    let divisor = gcd(width, height).max(1);
    format!("{}:{}", width / divisor, height / divisor)
}

/// Builds the catalog row, or `None` when duration, size or codec is missing.
pub fn media_from_probe(entry: &Entry, probe: &VideoProbe) -> Option<VideoMedia> {
    let duration = probe.duration?;
    let width = probe.width?;
    let height = probe.height?;
    let codec = probe.codec.clone()?;

    let title = probe.title.clone().unwrap_or_else(|| {
        Path::new(entry.file_name())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.file_name().to_string())
    });

    Some(VideoMedia {
        id: entry.id.clone(),
        entry_id: entry.id.clone(),
        media_type: "video".to_string(),
        title,
        description: probe.comment.clone(),
        duration,
        width,
        height,
        codec,
        frame_rate: probe.frame_rate,
        aspect_ratio: Some(aspect_ratio(probe.aspect_ratio.as_deref(), width, height)),
        quality: Some(quality_label(height).to_string()),
        thumbnail: None,
    })
}

pub struct VideoCatalog<'a> {
    db: &'a Database,
    prober: &'a dyn MediaProber,
    frame_count: usize,
}

impl<'a> VideoCatalog<'a> {
    pub fn new(db: &'a Database, prober: &'a dyn MediaProber, frame_count: usize) -> Self {
        Self {
            db,
            prober,
            frame_count,
        }
    }

    /// One sequential sweep over every video file in the entry store.
    pub fn run_pass(&self, reporter: &dyn ProgressReporter) -> Result<CatalogStats, Error> {
        let started = Instant::now();
        let mut stats = CatalogStats {
            pruned: self.db.prune_orphaned_video_media()?,
            ..Default::default()
        };

        let files = self.db.get_every_file()?;
        let candidates: Vec<&Entry> = files
            .iter()
            .filter(|e| has_mime_class(e, "video/"))
            .collect();
        reporter.on_catalog_start(CATALOG, candidates.len());

        for (index, entry) in candidates.iter().enumerate() {
            stats.seen += 1;
            match self.catalog_file(entry) {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    warn!("Video catalog failed on {}: {}", entry.path, e);
                    stats.failed += 1;
                }
            }
            reporter.on_catalog_progress(CATALOG, index + 1, candidates.len());
        }

        let elapsed = started.elapsed().as_secs_f64();
        reporter.on_catalog_complete(CATALOG, stats.inserted, elapsed);
        info!(
            "Video pass in {:.2}s: {} seen, {} inserted, {} skipped, \
             {} corrupted, {} rejected, {} failed",
            elapsed,
            stats.seen,
            stats.inserted,
            stats.skipped,
            stats.corrupted,
            stats.rejected,
            stats.failed,
        );
        Ok(stats)
    }

    fn catalog_file(&self, entry: &Entry) -> Result<Outcome, Error> {
        if self.db.video_media_exists(&entry.id)? {
            return Ok(Outcome::Present);
        }
        let path = Path::new(entry.disk_path());

        let hash = match content_hash(path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Cannot hash {}: {}", path.display(), e);
                return Ok(Outcome::Unreadable);
            }
        };
        if self.db.is_corrupted(CorruptionSet::Video, &hash)? {
            debug!("Skipping known corrupted video {}", entry.path);
            return Ok(Outcome::KnownCorrupt);
        }

        match self.prober.has_video_stream(path) {
            Ok(true) => {}
            Ok(false) => {
                let reason = "no video stream";
                return mark_corrupted(self.db, CorruptionSet::Video, &hash, entry, reason);
            }
            Err(e) => {
                let reason = e.to_string();
                return mark_corrupted(self.db, CorruptionSet::Video, &hash, entry, &reason);
            }
        }

        let probe = match self.prober.probe_video(path) {
            Ok(probe) => probe,
            Err(e) => {
                return mark_corrupted(self.db, CorruptionSet::Video, &hash, entry, &e.to_string())
            }
        };

        let Some(mut media) = media_from_probe(entry, &probe) else {
            debug!("Incomplete probe for {}, not cataloging: {:?}", entry.path, probe);
            return Ok(Outcome::Rejected);
        };

        match self
            .prober
            .extract_frame(path, media.duration * THUMBNAIL_AT, FrameKind::Thumbnail)
        {
            Ok(thumbnail) => media.thumbnail = Some(thumbnail),
            Err(e) => {
                return mark_corrupted(self.db, CorruptionSet::Video, &hash, entry, &e.to_string())
            }
        }

        if !self.db.insert_video_media(&media)? {
            return Ok(Outcome::Present);
        }
        debug!("Cataloged video {} ({})", entry.path, media.title);

        self.populate_frames(&media, path)?;
        self.populate_palettes(&media, path)?;
        Ok(Outcome::Inserted)
    }

    /// Frame grid, probed concurrently. Frames that fail to extract are left out.
    fn populate_frames(&self, media: &VideoMedia, path: &Path) -> Result<usize, Error> {
        let stamps = evenly_spaced(media.duration, self.frame_count);
        let prober = self.prober;
        let frames: Vec<VideoFrame> = stamps
            .par_iter()
            .enumerate()
            .filter_map(|(position, &timestamp)| {
                match prober.extract_frame(path, timestamp, FrameKind::Grid) {
                    Ok(frame) => Some(VideoFrame {
                        video_media_id: media.id.clone(),
                        position: position as u32,
                        timestamp,
                        frame,
                    }),
                    Err(e) => {
                        warn!("Frame at {:.2}s of {} failed: {}", timestamp, path.display(), e);
                        None
                    }
                }
            })
            .collect();
        Ok(self.db.replace_video_frames(&media.id, &frames)?)
    }

    /// Colour samples, extracted one at a time.
    fn populate_palettes(&self, media: &VideoMedia, path: &Path) -> Result<usize, Error> {
        let stamps = evenly_spaced(media.duration, sample_count(media.duration));
        let mut palettes = Vec::with_capacity(stamps.len());
        for (position, timestamp) in stamps.into_iter().enumerate() {
            let colors = self
                .prober
                .extract_frame(path, timestamp, FrameKind::Swatch)
                .and_then(|swatch| sample_palette(&swatch));
            match colors {
                Ok(colors) => palettes.push(VideoColorPalette {
                    video_media_id: media.id.clone(),
                    position: position as u32,
                    timestamp,
                    colors,
                }),
                Err(e) => warn!("Palette at {:.2}s of {} failed: {}", timestamp, path.display(), e),
            }
        }
        Ok(self.db.replace_video_palettes(&media.id, &palettes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{EntryMeta, EntryType};

    fn entry(path: &str) -> Entry {
        Entry {
            id: "e1".into(),
            entry_type: EntryType::File,
            path: path.into(),
            size: Some(1),
            mime_type: Some("video/mp4".into()),
            comment: None,
            tags: vec![],
            meta: EntryMeta::Timestamps {
                created: None,
                modified: None,
            },
            parent_id: None,
            is_phantom_symlink: false,
        }
    }

    fn full_probe() -> VideoProbe {
        VideoProbe {
            duration: Some(90.0),
            width: Some(1280),
            height: Some(720),
            codec: Some("h264".into()),
            frame_rate: Some(25.0),
            aspect_ratio: None,
            title: None,
            comment: Some("notes".into()),
        }
    }

    #[test]
    fn quality_labels() {
        assert_eq!(quality_label(2160), "4K");
        assert_eq!(quality_label(1440), "1440p");
        assert_eq!(quality_label(1080), "1080p");
        assert_eq!(quality_label(1079), "720p");
        assert_eq!(quality_label(480), "480p");
        assert_eq!(quality_label(360), "SD");
    }

    #[test]
    fn aspect_ratio_prefers_display_ratio() {
        assert_eq!(aspect_ratio(Some("4:3"), 1920, 1080), "4:3");
        assert_eq!(aspect_ratio(None, 1920, 1080), "16:9");
        assert_eq!(aspect_ratio(None, 1280, 720), "16:9");
        assert_eq!(aspect_ratio(None, 0, 0), "0:0");
    }

    #[test]
    fn complete_probe_builds_media() {
        let media = media_from_probe(&entry("/v/Holiday Trip.mp4"), &full_probe()).unwrap();
        assert_eq!(media.id, "e1");
        assert_eq!(media.entry_id, "e1");
        assert_eq!(media.title, "Holiday Trip");
        assert_eq!(media.description.as_deref(), Some("notes"));
        assert_eq!(media.quality.as_deref(), Some("720p"));
        assert_eq!(media.aspect_ratio.as_deref(), Some("16:9"));
    }

    #[test]
    fn any_missing_required_field_rejects() {
        let e = entry("/v/a.mp4");
        for strip in 0..4 {
            let mut probe = full_probe();
            match strip {
                0 => probe.duration = None,
                1 => probe.width = None,
                2 => probe.height = None,
                _ => probe.codec = None,
            }
            assert!(media_from_probe(&e, &probe).is_none(), "field {} not enforced", strip);
        }
    }
}
