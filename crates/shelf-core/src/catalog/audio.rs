use super::{has_mime_class, mark_corrupted, CatalogStats, Outcome};
use crate::error::Error;
use crate::hasher::content_hash;
use crate::probe::{AudioProbe, MediaProber};
use crate::progress::ProgressReporter;
use crate::storage::models::{AudioTrack, CorruptionSet, Entry};
use crate::storage::Database;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const CATALOG: &str = "audio";
/// Aggregates are rebuilt after this many inserts, and once more at the end of a pass.
pub const AGGREGATE_EVERY: usize = 30;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";

fn strip_track_prefix(stem: &str) -> &str {
    let trimmed = stem.trim_start();
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return stem;
    }
    let rest = &trimmed[digits..];
    let after_space = rest.trim_start();
    if let Some(title) = after_space.strip_prefix(['-', '.', '_', ')']) {
        title
    } else if after_space.len() < rest.len() {
        after_space
    } else {
        stem
    }
}

fn collapse_separators(text: &str) -> String {
    text.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"03 - My_Song.flac"` → `"My Song"`. Falls back to the bare stem when
/// stripping would leave nothing.
pub fn title_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    let title = collapse_separators(strip_track_prefix(&stem));
    if title.is_empty() {
        collapse_separators(&stem)
    } else {
        title
    }
}

/// `"3/12"` → `(Some(3), Some(12))`, `"7"` → `(Some(7), None)`.
pub fn parse_position(raw: Option<&str>) -> (Option<u32>, Option<u32>) {
    let Some(raw) = raw else {
        return (None, None);
    };
    let mut parts = raw.splitn(2, '/');
    let number = parts.next().and_then(|n| n.trim().parse().ok());
    let total = parts.next().and_then(|t| t.trim().parse().ok());
    (number, total)
}

/// First four-digit year in a date tag (`"1997"`, `"1997-05-12"`).
pub fn parse_year(raw: Option<&str>) -> Option<i32> {
    let raw = raw?.trim();
    raw.get(..4)
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .and_then(|y| y.parse().ok())
}

/// Builds the catalog row; missing tags fall back to placeholders.
pub fn track_from_probe(
    entry: &Entry,
    probe: &AudioProbe,
    cover_art: Option<Vec<u8>>,
) -> AudioTrack {
    let title = probe
        .tag(&["title"])
        .map(str::to_string)
        .unwrap_or_else(|| title_from_file_name(entry.file_name()));
    let artist = probe
        .tag(&["artist"])
        .unwrap_or(UNKNOWN_ARTIST)
        .to_string();
    let album_artist = probe
        .tag(&["album_artist", "albumartist", "album artist"])
        .map(str::to_string)
        .unwrap_or_else(|| artist.clone());

    let (track_number, track_total) = parse_position(probe.tag(&["track", "tracknumber"]));
    let (disk_number, disk_total) = parse_position(probe.tag(&["disc", "discnumber"]));

    AudioTrack {
        id: entry.id.clone(),
        entry_id: entry.id.clone(),
        title,
        artist,
        album: probe.tag(&["album"]).unwrap_or(UNKNOWN_ALBUM).to_string(),
        album_artist,
        year: parse_year(probe.tag(&["date", "year"])),
        genre: probe.tag(&["genre"]).unwrap_or(UNKNOWN_GENRE).to_string(),
        track_number,
        track_total: track_total.or_else(|| {
            parse_position(probe.tag(&["tracktotal", "totaltracks"])).0
        }),
        disk_number,
        disk_total: disk_total
            .or_else(|| parse_position(probe.tag(&["disctotal", "totaldiscs"])).0),
        duration: probe.duration,
        bitrate: probe.bitrate,
        sample_rate: probe.sample_rate,
        channels: probe.channels,
        codec: probe.codec.clone(),
        cover_art,
    }
}

pub struct AudioCatalog<'a> {
    db: &'a Database,
    prober: &'a dyn MediaProber,
}

impl<'a> AudioCatalog<'a> {
    pub fn new(db: &'a Database, prober: &'a dyn MediaProber) -> Self {
        Self { db, prober }
    }

    /// One sequential sweep over every audio file in the entry store.
    pub fn run_pass(&self, reporter: &dyn ProgressReporter) -> Result<CatalogStats, Error> {
        let started = Instant::now();
        let mut stats = CatalogStats {
            pruned: self.db.prune_orphaned_audio_tracks()?,
            ..Default::default()
        };

        let files = self.db.get_every_file()?;
        let candidates: Vec<&Entry> = files
            .iter()
            .filter(|e| has_mime_class(e, "audio/"))
            .collect();
        reporter.on_catalog_start(CATALOG, candidates.len());

        let mut since_rebuild = 0;
        for (index, entry) in candidates.iter().enumerate() {
            stats.seen += 1;
            match self.catalog_file(entry) {
                Ok(outcome) => {
                    stats.record(outcome);
                    if outcome == Outcome::Inserted {
                        since_rebuild += 1;
                        if since_rebuild >= AGGREGATE_EVERY {
                            self.db.rebuild_audio_aggregates()?;
                            since_rebuild = 0;
                        }
                    }
                }
                Err(e) => {
                    warn!("Audio catalog failed on {}: {}", entry.path, e);
                    stats.failed += 1;
                }
            }
            reporter.on_catalog_progress(CATALOG, index + 1, candidates.len());
        }
        self.db.rebuild_audio_aggregates()?;

        let elapsed = started.elapsed().as_secs_f64();
        reporter.on_catalog_complete(CATALOG, stats.inserted, elapsed);
        info!(
            "Audio pass in {:.2}s: {} seen, {} inserted, {} skipped, {} corrupted, {} failed",
            elapsed, stats.seen, stats.inserted, stats.skipped, stats.corrupted, stats.failed,
        );
        Ok(stats)
    }

    fn catalog_file(&self, entry: &Entry) -> Result<Outcome, Error> {
        if self.db.audio_track_exists(&entry.id)? {
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
        if self.db.is_corrupted(CorruptionSet::Audio, &hash)? {
            debug!("Skipping known corrupted audio {}", entry.path);
            return Ok(Outcome::KnownCorrupt);
        }

        let probe = match self.prober.probe_audio(path) {
            Ok(probe) => probe,
            Err(e) => {
                return mark_corrupted(self.db, CorruptionSet::Audio, &hash, entry, &e.to_string())
            }
        };

        let cover_art = if probe.has_cover_art {
            self.prober.extract_cover_art(path).unwrap_or_else(|e| {
                warn!("Cover art of {} unreadable: {}", path.display(), e);
                None
            })
        } else {
            None
        };

        let track = track_from_probe(entry, &probe, cover_art);
        if !self.db.insert_audio_track(&track)? {
            return Ok(Outcome::Present);
        }
        debug!("Cataloged track {} - {}", track.artist, track.title);
        Ok(Outcome::Inserted)
    }
}
