use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

const TRACK_COLUMNS: &str = "id, entry_id, title, artist, album, album_artist, year, genre, \
                             track_number, track_total, disk_number, disk_total, duration, \
                             bitrate, sample_rate, channels, codec, cover_art";

fn track_from_row(row: &Row<'_>) -> Result<AudioTrack> {
    Ok(AudioTrack {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        album: row.get(4)?,
        album_artist: row.get(5)?,
        year: row.get(6)?,
        genre: row.get(7)?,
        track_number: row.get(8)?,
        track_total: row.get(9)?,
        disk_number: row.get(10)?,
        disk_total: row.get(11)?,
        duration: row.get(12)?,
        bitrate: row.get::<_, Option<i64>>(13)?.map(|b| b as u64),
        sample_rate: row.get(14)?,
        channels: row.get(15)?,
        codec: row.get(16)?,
        cover_art: row.get(17)?,
    })
}

/// Row counts written by one aggregate rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateCounts {
    pub albums: usize,
    pub artists: usize,
    pub genres: usize,
}

impl Database {
    // ── Audio Tracks ─────────────────────────────────────────────

    pub fn audio_track_exists(&self, entry_id: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM audio_tracks WHERE id = ?1 OR entry_id = ?1",
            params![entry_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Inserts once per entry; returns false when already present.
    pub fn insert_audio_track(&self, track: &AudioTrack) -> Result<bool> {
        if self.audio_track_exists(&track.id)? || self.audio_track_exists(&track.entry_id)? {
            debug!("Audio track {} already present, not inserting", track.id);
            return Ok(false);
        }
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            &format!(
                "INSERT INTO audio_tracks ({}, created_at) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                  ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                TRACK_COLUMNS
            ),
            params![
                track.id,
                track.entry_id,
                track.title,
                track.artist,
                track.album,
                track.album_artist,
                track.year,
                track.genre,
                track.track_number,
                track.track_total,
                track.disk_number,
                track.disk_total,
                track.duration,
                track.bitrate.map(|b| b as i64),
                track.sample_rate,
                track.channels,
                track.codec,
                track.cover_art,
                now,
            ],
        )?;
        Ok(true)
    }

    pub fn get_audio_track(&self, id: &str) -> Result<Option<AudioTrack>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM audio_tracks WHERE id = ?1", TRACK_COLUMNS),
                params![id],
                track_from_row,
            )
            .optional()
    }

    pub fn list_audio_tracks(&self, offset: i64, limit: i64) -> Result<Vec<AudioTrack>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM audio_tracks \
             ORDER BY album_artist, album, disk_number, track_number, title \
             LIMIT ?1 OFFSET ?2",
            TRACK_COLUMNS
        ))?;
        let tracks = stmt
            .query_map(params![limit, offset], track_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(tracks)
    }

    pub fn prune_orphaned_audio_tracks(&self) -> Result<usize> {
        let removed = self.connection().execute(
            "DELETE FROM audio_tracks WHERE entry_id NOT IN (SELECT id FROM entries)",
            [],
        )?;
        if removed > 0 {
            debug!("Pruned {} orphaned audio tracks", removed);
        }
        Ok(removed)
    }

    // ── Aggregates ───────────────────────────────────────────────

    /// Recomputes albums, artists and genres from scratch out of audio_tracks.
    pub fn rebuild_audio_aggregates(&self) -> Result<AggregateCounts> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM albums;
             DELETE FROM artists;
             DELETE FROM genres;",
        )?;

        let albums = tx.execute(
            "INSERT INTO albums (name, artist, year, track_count, total_duration, cover_track_id) \
             SELECT album, album_artist, MAX(year), COUNT(*), COALESCE(SUM(duration), 0), \
                    (SELECT t2.id FROM audio_tracks t2 \
                     WHERE t2.album = t.album AND t2.album_artist = t.album_artist \
                       AND t2.cover_art IS NOT NULL \
                     ORDER BY t2.disk_number, t2.track_number LIMIT 1) \
             FROM audio_tracks t \
             GROUP BY album_artist, album \
             ORDER BY album_artist, album",
            [],
        )?;

        let artists = tx.execute(
            "INSERT INTO artists (name, album_count, track_count) \
             SELECT artist, COUNT(DISTINCT album), COUNT(*) \
             FROM audio_tracks GROUP BY artist ORDER BY artist",
            [],
        )?;

        let genres = tx.execute(
            "INSERT INTO genres (name, track_count) \
             SELECT genre, COUNT(*) FROM audio_tracks GROUP BY genre ORDER BY genre",
            [],
        )?;

        tx.commit()?;
        debug!(
            "Rebuilt audio aggregates: {} albums, {} artists, {} genres",
            albums, artists, genres
        );
        Ok(AggregateCounts {
            albums,
            artists,
            genres,
        })
    }

    pub fn list_albums(&self) -> Result<Vec<Album>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, name, artist, year, track_count, total_duration, cover_track_id \
             FROM albums ORDER BY artist, name",
        )?;
        let albums = stmt
            .query_map([], |row| {
                Ok(Album {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artist: row.get(2)?,
                    year: row.get(3)?,
                    track_count: row.get(4)?,
                    total_duration: row.get(5)?,
                    cover_track_id: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(albums)
    }

    pub fn list_artists(&self) -> Result<Vec<Artist>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, name, album_count, track_count FROM artists ORDER BY name",
        )?;
        let artists = stmt
            .query_map([], |row| {
                Ok(Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    album_count: row.get(2)?,
                    track_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(artists)
    }

    pub fn list_genres(&self) -> Result<Vec<Genre>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, name, track_count FROM genres ORDER BY name")?;
        let genres = stmt
            .query_map([], |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    track_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(genres)
    }
}
