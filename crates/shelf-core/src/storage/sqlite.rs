use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Result};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.register_functions()?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.register_functions()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, foreign keys on)");
        Ok(())
    }

    /// `fold(text)` lowercases with full Unicode rules; SQLite's `lower()`
    /// only folds ASCII.
    fn register_functions(&self) -> Result<()> {
        self.conn.create_scalar_function(
            "fold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| t.to_lowercase()))
            },
        )
    }

    /// Check schema version and migrate if needed.
    /// Anything older than the current version predates user data and is rebuilt.
    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version > 0 && version < SCHEMA_VERSION {
            debug!(
                "Schema version {} < {}, dropping all tables and recreating",
                version, SCHEMA_VERSION
            );
            self.drop_all()?;
        }

        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    fn drop_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS corrupted_audio_files;
             DROP TABLE IF EXISTS genres;
             DROP TABLE IF EXISTS artists;
             DROP TABLE IF EXISTS albums;
             DROP TABLE IF EXISTS audio_tracks;
             DROP TABLE IF EXISTS corrupted_files;
             DROP TABLE IF EXISTS video_color_palettes;
             DROP TABLE IF EXISTS video_frames;
             DROP TABLE IF EXISTS video_media;
             DROP TABLE IF EXISTS file_passwords;
             DROP TABLE IF EXISTS entries;",
        )
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM corrupted_audio_files;
             DELETE FROM genres;
             DELETE FROM artists;
             DELETE FROM albums;
             DELETE FROM audio_tracks;
             DELETE FROM corrupted_files;
             DELETE FROM video_color_palettes;
             DELETE FROM video_frames;
             DELETE FROM video_media;
             DELETE FROM file_passwords;
             DELETE FROM entries;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}
