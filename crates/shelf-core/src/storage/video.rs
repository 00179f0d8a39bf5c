use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

const VIDEO_COLUMNS: &str = "id, entry_id, media_type, title, description, duration, width, \
                             height, codec, frame_rate, aspect_ratio, quality, thumbnail";

fn video_from_row(row: &Row<'_>) -> Result<VideoMedia> {
    Ok(VideoMedia {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        media_type: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        duration: row.get(5)?,
        width: row.get(6)?,
        height: row.get(7)?,
        codec: row.get(8)?,
        frame_rate: row.get(9)?,
        aspect_ratio: row.get(10)?,
        quality: row.get(11)?,
        thumbnail: row.get(12)?,
    })
}

impl Database {
    // ── Video Media ──────────────────────────────────────────────

    pub fn video_media_exists(&self, entry_id: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM video_media WHERE id = ?1 OR entry_id = ?1",
            params![entry_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Inserts once per entry; returns false when a row for the id or entry
    /// already exists. Rows are never updated afterwards.
    pub fn insert_video_media(&self, media: &VideoMedia) -> Result<bool> {
        if self.video_media_exists(&media.id)? || self.video_media_exists(&media.entry_id)? {
            debug!("Video media {} already present, not inserting", media.id);
            return Ok(false);
        }
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            &format!(
                "INSERT INTO video_media ({}, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                VIDEO_COLUMNS
            ),
            params![
                media.id,
                media.entry_id,
                media.media_type,
                media.title,
                media.description,
                media.duration,
                media.width,
                media.height,
                media.codec,
                media.frame_rate,
                media.aspect_ratio,
                media.quality,
                media.thumbnail,
                now,
            ],
        )?;
        Ok(true)
    }

    pub fn get_video_media(&self, id: &str) -> Result<Option<VideoMedia>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM video_media WHERE id = ?1", VIDEO_COLUMNS),
                params![id],
                video_from_row,
            )
            .optional()
    }

    pub fn list_video_media(&self, offset: i64, limit: i64) -> Result<Vec<VideoMedia>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM video_media ORDER BY title LIMIT ?1 OFFSET ?2",
            VIDEO_COLUMNS
        ))?;
        let media = stmt
            .query_map(params![limit, offset], video_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(media)
    }

    /// Drops video rows whose entry has left the catalog; frames and palettes cascade.
    pub fn prune_orphaned_video_media(&self) -> Result<usize> {
        let removed = self.connection().execute(
            "DELETE FROM video_media WHERE entry_id NOT IN (SELECT id FROM entries)",
            [],
        )?;
        if removed > 0 {
            debug!("Pruned {} orphaned video media rows", removed);
        }
        Ok(removed)
    }

    // ── Frames & Palettes ────────────────────────────────────────

    pub fn replace_video_frames(
        &self,
        video_media_id: &str,
        frames: &[VideoFrame],
    ) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM video_frames WHERE video_media_id = ?1",
            params![video_media_id],
        )?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO video_frames (video_media_id, position, timestamp, frame) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for frame in frames {
                count += stmt.execute(params![
                    video_media_id,
                    frame.position,
                    frame.timestamp,
                    frame.frame,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Stored {} frames for video {}", count, video_media_id);
        Ok(count)
    }

    pub fn get_video_frames(&self, video_media_id: &str) -> Result<Vec<VideoFrame>> {
        let mut stmt = self.connection().prepare(
            "SELECT video_media_id, position, timestamp, frame FROM video_frames \
             WHERE video_media_id = ?1 ORDER BY position",
        )?;
        let frames = stmt
            .query_map(params![video_media_id], |row| {
                Ok(VideoFrame {
                    video_media_id: row.get(0)?,
                    position: row.get(1)?,
                    timestamp: row.get(2)?,
                    frame: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(frames)
    }

    pub fn replace_video_palettes(
        &self,
        video_media_id: &str,
        palettes: &[VideoColorPalette],
    ) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM video_color_palettes WHERE video_media_id = ?1",
            params![video_media_id],
        )?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO video_color_palettes \
                 (video_media_id, position, timestamp, top_left, top_right, bottom_left, \
                  bottom_right, center) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for palette in palettes {
                count += stmt.execute(params![
                    video_media_id,
                    palette.position,
                    palette.timestamp,
                    palette.colors.top_left,
                    palette.colors.top_right,
                    palette.colors.bottom_left,
                    palette.colors.bottom_right,
                    palette.colors.center,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Stored {} palette samples for video {}", count, video_media_id);
        Ok(count)
    }

    pub fn get_video_palettes(&self, video_media_id: &str) -> Result<Vec<VideoColorPalette>> {
        let mut stmt = self.connection().prepare(
            "SELECT video_media_id, position, timestamp, top_left, top_right, bottom_left, \
                    bottom_right, center \
             FROM video_color_palettes WHERE video_media_id = ?1 ORDER BY position",
        )?;
        let palettes = stmt
            .query_map(params![video_media_id], |row| {
                Ok(VideoColorPalette {
                    video_media_id: row.get(0)?,
                    position: row.get(1)?,
                    timestamp: row.get(2)?,
                    colors: PaletteColors {
                        top_left: row.get(3)?,
                        top_right: row.get(4)?,
                        bottom_left: row.get(5)?,
                        bottom_right: row.get(6)?,
                        center: row.get(7)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(palettes)
    }

    // ── Corrupted Files ──────────────────────────────────────────

    pub fn is_corrupted(&self, set: CorruptionSet, content_hash: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE content_hash = ?1", set.table()),
            params![content_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn mark_corrupted(&self, set: CorruptionSet, content_hash: &str, path: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            &format!(
                "INSERT OR IGNORE INTO {} (content_hash, path, detected_at) VALUES (?1, ?2, ?3)",
                set.table()
            ),
            params![content_hash, path, now],
        )?;
        debug!("Marked {} as corrupted ({:?} catalog)", path, set);
        Ok(())
    }
}
