use super::models::*;
use super::sqlite::Database;
use crate::error::Error;
use rusqlite::types::Type;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const ENTRY_COLUMNS: &str =
    "id, type, path, size, mime_type, comment, tags, meta, parent_id, is_phantom_symlink";

pub const MAX_SEARCH_LIMIT: usize = 1000;

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let type_str: String = row.get(1)?;
    let entry_type = type_str.parse::<EntryType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
    })?;
    let size: Option<i64> = row.get(3)?;
    let tags_json: String = row.get(6)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let meta_json: String = row.get(7)?;
    let meta: EntryMeta = serde_json::from_str(&meta_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(Entry {
        id: row.get(0)?,
        entry_type,
        path: row.get(2)?,
        size: size.map(|s| s as u64),
        mime_type: row.get(4)?,
        comment: row.get(5)?,
        tags,
        meta,
        parent_id: row.get(8)?,
        is_phantom_symlink: row.get(9)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains("entries.path")
    )
}

/// Keeps first-seen order and drops blanks and repeats.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

impl Database {
    // ── Validation ───────────────────────────────────────────────

    fn validate_entry(&self, entry: &Entry) -> Result<Option<i64>, Error> {
        if !Path::new(&entry.path).is_absolute() {
            return Err(Error::RelativePath(entry.path.clone()));
        }

        let size = match entry.size {
            Some(size) => Some(i64::try_from(size).map_err(|_| Error::InvalidSize {
                path: entry.path.clone(),
                size,
            })?),
            None => None,
        };

        if let Some(parent_id) = &entry.parent_id {
            if !self.entry_exists(parent_id)? {
                return Err(Error::ParentNotFound {
                    path: entry.path.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }

        Ok(size)
    }

    pub fn entry_exists(&self, id: &str) -> Result<bool, Error> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM entries WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── Mutation ─────────────────────────────────────────────────

    pub fn create_entry(&self, entry: &Entry) -> Result<(), Error> {
        let size = self.validate_entry(entry)?;
        if self.get_entry_by_path(&entry.path)?.is_some() {
            return Err(Error::DuplicatePath(entry.path.clone()));
        }

        let tags = serde_json::to_string(&entry.tags)?;
        let meta = serde_json::to_string(&entry.meta)?;
        self.connection()
            .execute(
                &format!(
                    "INSERT INTO entries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    ENTRY_COLUMNS
                ),
                params![
                    entry.id,
                    entry.entry_type.as_str(),
                    entry.path,
                    size,
                    entry.mime_type,
                    entry.comment,
                    tags,
                    meta,
                    entry.parent_id,
                    entry.is_phantom_symlink,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicatePath(entry.path.clone())
                } else {
                    Error::Database(e)
                }
            })?;
        debug!("Created {} entry {}", entry.entry_type, entry.path);
        Ok(())
    }

    /// Replaces every column of the row with the same id.
    pub fn update_entry(&self, entry: &Entry) -> Result<(), Error> {
        let size = self.validate_entry(entry)?;
        let tags = serde_json::to_string(&entry.tags)?;
        let meta = serde_json::to_string(&entry.meta)?;
        let changed = self
            .connection()
            .execute(
                "UPDATE entries SET type = ?2, path = ?3, size = ?4, mime_type = ?5, \
                 comment = ?6, tags = ?7, meta = ?8, parent_id = ?9, is_phantom_symlink = ?10 \
                 WHERE id = ?1",
                params![
                    entry.id,
                    entry.entry_type.as_str(),
                    entry.path,
                    size,
                    entry.mime_type,
                    entry.comment,
                    tags,
                    meta,
                    entry.parent_id,
                    entry.is_phantom_symlink,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicatePath(entry.path.clone())
                } else {
                    Error::Database(e)
                }
            })?;
        if changed == 0 {
            return Err(Error::NotFound(entry.id.clone()));
        }
        debug!("Updated {} entry {}", entry.entry_type, entry.path);
        Ok(())
    }

    /// Deletes the entry; descendants and its password go with it.
    pub fn delete_entry(&self, id: &str) -> Result<bool, Error> {
        let changed = self
            .connection()
            .execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn set_comment(&self, id: &str, comment: Option<&str>) -> Result<(), Error> {
        let changed = self.connection().execute(
            "UPDATE entries SET comment = ?2 WHERE id = ?1",
            params![id, comment],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_tags(&self, id: &str, tags: Vec<String>) -> Result<(), Error> {
        let tags = serde_json::to_string(&normalize_tags(tags))?;
        let changed = self.connection().execute(
            "UPDATE entries SET tags = ?2 WHERE id = ?1",
            params![id, tags],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    // ── Lookup ───────────────────────────────────────────────────

    pub fn get_entry_by_id(&self, id: &str) -> Result<Option<Entry>, Error> {
        let entry = self
            .connection()
            .query_row(
                &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn get_entry_by_path(&self, path: &str) -> Result<Option<Entry>, Error> {
        let entry = self
            .connection()
            .query_row(
                &format!("SELECT {} FROM entries WHERE path = ?1", ENTRY_COLUMNS),
                params![path],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn get_children(
        &self,
        parent_id: &str,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<Entry>, Error> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM entries WHERE parent_id = ?1 AND (?2 IS NULL OR type = ?2) \
             ORDER BY path",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![parent_id, entry_type.map(|t| t.as_str())], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Every entry below `root_id` at any depth, excluding the root itself.
    pub fn get_descendants(&self, root_id: &str) -> Result<Vec<Entry>, Error> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "WITH RECURSIVE subtree(id) AS ( \
                 SELECT id FROM entries WHERE parent_id = ?1 \
                 UNION \
                 SELECT e.id FROM entries e JOIN subtree s ON e.parent_id = s.id \
             ) \
             SELECT {} FROM entries WHERE id IN (SELECT id FROM subtree) ORDER BY path",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![root_id], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn list_by_path_prefix(&self, prefix: &str) -> Result<Vec<Entry>, Error> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM entries WHERE substr(path, 1, length(?1)) = ?1 ORDER BY path",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![prefix], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Case-insensitive substring search over path, comment and tags.
    /// Folders rank first, then everything by path.
    pub fn search_entries(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<Entry>, Error> {
        let limit = options.limit.clamp(1, MAX_SEARCH_LIMIT) as i64;
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM entries \
             WHERE (instr(fold(path), fold(?1)) > 0 \
                    OR instr(fold(COALESCE(comment, '')), fold(?1)) > 0 \
                    OR instr(fold(tags), fold(?1)) > 0) \
               AND (?2 IS NULL OR type = ?2) \
             ORDER BY CASE type WHEN 'folder' THEN 0 ELSE 1 END, path \
             LIMIT ?3",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(
                params![query, options.entry_type.map(|t| t.as_str()), limit],
                entry_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Tag usage counts, most used first, ties by name.
    pub fn get_tag_cloud(
        &self,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TagCount>, Error> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT j.value AS tag, COUNT(*) AS n \
             FROM entries, json_each(entries.tags) AS j \
             WHERE ?1 IS NULL OR instr(fold(j.value), fold(?1)) = 1 \
             GROUP BY j.value \
             ORDER BY n DESC, tag ASC \
             LIMIT ?2",
        )?;
        let tags = stmt
            .query_map(params![prefix, limit as i64], |row| {
                Ok(TagCount {
                    tag: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    pub fn get_every_file(&self) -> Result<Vec<Entry>, Error> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM entries WHERE type = 'file' ORDER BY path",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count_entries(&self) -> Result<i64, Error> {
        let count = self
            .connection()
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_tags_dedups_in_order() {
        let tags = vec![
            "b".to_string(),
            " a ".to_string(),
            "b".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["b".to_string(), "a".to_string()]);
    }
}
