use super::models::{EntryType, FilePassword};
use super::sqlite::Database;
use crate::error::Error;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

fn hash_password(plaintext: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| Error::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

impl Database {
    /// Sets or replaces the password guarding a file entry.
    pub fn set_file_password(&self, file_id: &str, plaintext: &str) -> Result<(), Error> {
        match self.get_entry_by_id(file_id)? {
            None => return Err(Error::NotFound(file_id.to_string())),
            Some(entry) if entry.entry_type != EntryType::File => {
                return Err(Error::Other(format!(
                    "passwords can only guard files, {} is a {}",
                    entry.path, entry.entry_type
                )));
            }
            Some(_) => {}
        }
        let hash = hash_password(plaintext)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO file_passwords (file_id, password_hash, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(file_id) DO UPDATE SET \
                 password_hash = excluded.password_hash, \
                 created_at = excluded.created_at",
            params![file_id, hash, now],
        )?;
        debug!("Password set for entry {}", file_id);
        Ok(())
    }

    pub fn has_file_password(&self, file_id: &str) -> Result<bool, Error> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM file_passwords WHERE file_id = ?1",
            params![file_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_file_password(&self, file_id: &str) -> Result<Option<FilePassword>, Error> {
        let password = self
            .connection()
            .query_row(
                "SELECT file_id, password_hash, created_at FROM file_passwords WHERE file_id = ?1",
                params![file_id],
                |row| {
                    Ok(FilePassword {
                        file_id: row.get(0)?,
                        password_hash: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(password)
    }

    pub fn get_file_password_hash(&self, file_id: &str) -> Result<Option<String>, Error> {
        Ok(self.get_file_password(file_id)?.map(|p| p.password_hash))
    }

    pub fn remove_file_password(&self, file_id: &str) -> Result<bool, Error> {
        let changed = self.connection().execute(
            "DELETE FROM file_passwords WHERE file_id = ?1",
            params![file_id],
        )?;
        Ok(changed > 0)
    }

    /// False when no password is set or the plaintext does not match.
    pub fn verify_file_password(&self, file_id: &str, plaintext: &str) -> Result<bool, Error> {
        let Some(stored) = self.get_file_password_hash(file_id)? else {
            return Ok(false);
        };
        let parsed = match PasswordHash::new(&stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password hash for {} is unreadable: {}", file_id, e);
                return Ok(false);
            }
        };
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}
