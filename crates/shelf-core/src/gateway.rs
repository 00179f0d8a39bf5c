//! Password-gated, range-capable byte delivery for cataloged files.
//!
//! Transport agnostic: the HTTP layer turns a request into a
//! [`StreamRequest`] and writes the [`StreamResponse`] (or the status of a
//! [`GatewayError`]) back out.

use crate::error::Error;
use crate::storage::models::{Entry, EntryType};
use crate::storage::Database;
use http_range::{HttpRange, HttpRangeParseError};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Playback endpoint; GET requires a Range header.
    Stream,
    /// Full-file delivery; Range is honoured when present.
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMethod {
    Head,
    Get,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    pub id: &'a str,
    pub method: GatewayMethod,
    pub endpoint: Endpoint,
    pub password: Option<&'a str>,
    pub range: Option<&'a str>,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing entry id")]
    MissingId,

    #[error("entry {0} is not a file")]
    InvalidType(String),

    #[error("entry {0} not found")]
    NotFound(String),

    #[error("file for entry {0} is missing from disk")]
    MissingOnDisk(String),

    #[error("password required")]
    Unauthorized,

    #[error("wrong password")]
    Forbidden,

    #[error("range not satisfiable: {reason}")]
    RangeNotSatisfiable { total: u64, reason: String },

    #[error(transparent)]
    Internal(#[from] Error),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::MissingId | GatewayError::InvalidType(_) => 400,
            GatewayError::Unauthorized => 401,
            GatewayError::Forbidden => 403,
            GatewayError::NotFound(_) | GatewayError::MissingOnDisk(_) => 404,
            GatewayError::RangeNotSatisfiable { .. } => 416,
            GatewayError::Internal(_) => 500,
        }
    }

    /// `Content-Range: bytes */total` for unsatisfiable ranges.
    pub fn content_range(&self) -> Option<String> {
        match self {
            GatewayError::RangeNotSatisfiable { total, .. } => Some(format!("bytes */{}", total)),
            _ => None,
        }
    }
}

/// A byte window of a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSlice {
    pub path: PathBuf,
    pub start: u64,
    pub length: u64,
}

impl ByteSlice {
    /// Reader positioned at `start`, limited to `length` bytes.
    pub fn open(&self) -> io::Result<io::Take<File>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.start))?;
        Ok(file.take(self.length))
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.length as usize);
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    /// Absent for HEAD.
    pub body: Option<ByteSlice>,
}

impl StreamResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Resolves a `Range` header against a resource of `total` bytes into
/// `(start, length)`. Only single ranges are served.
pub fn plan_range(header: &str, total: u64) -> Result<(u64, u64), GatewayError> {
    let unsatisfiable = |reason: String| GatewayError::RangeNotSatisfiable { total, reason };
    let ranges = HttpRange::parse(header, total).map_err(|e| match e {
        HttpRangeParseError::NoOverlap => {
            unsatisfiable(format!("'{}' is outside 0-{}", header, total))
        }
        _ => unsatisfiable(format!("malformed range '{}'", header)),
    })?;
    match ranges.as_slice() {
        [range] if range.length > 0 && range.start + range.length <= total => {
            Ok((range.start, range.length))
        }
        [_] => Err(unsatisfiable(format!("'{}' is outside 0-{}", header, total))),
        _ => Err(unsatisfiable("multiple ranges are not supported".to_string())),
    }
}

pub struct StreamingGateway<'a> {
    db: &'a Database,
}

impl<'a> StreamingGateway<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Resolves the entry and checks its password. Returns the entry and the
    /// on-disk path of its bytes.
    pub fn authorize(
        &self,
        id: &str,
        password: Option<&str>,
    ) -> Result<(Entry, PathBuf), GatewayError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(GatewayError::MissingId);
        }
        let entry = self
            .db
            .get_entry_by_id(id)?
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        if entry.entry_type != EntryType::File {
            return Err(GatewayError::InvalidType(id.to_string()));
        }

        if self.db.has_file_password(id)? {
            match password.filter(|p| !p.is_empty()) {
                None => return Err(GatewayError::Unauthorized),
                Some(plaintext) => {
                    if !self.db.verify_file_password(id, plaintext)? {
                        debug!("Rejected password for {}", id);
                        return Err(GatewayError::Forbidden);
                    }
                }
            }
        }

        let path = PathBuf::from(entry.disk_path());
        Ok((entry, path))
    }

    pub fn handle(&self, request: &StreamRequest<'_>) -> Result<StreamResponse, GatewayError> {
        let (entry, path) = self.authorize(request.id, request.password)?;
        let total = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m.len(),
            _ => return Err(GatewayError::MissingOnDisk(entry.id)),
        };

        let mut headers: Vec<(&'static str, String)> = vec![
            ("Accept-Ranges", "bytes".to_string()),
            (
                "Content-Type",
                entry.mime_type.clone().unwrap_or_else(|| OCTET_STREAM.to_string()),
            ),
        ];
        if request.endpoint == Endpoint::Download {
            headers.push((
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", entry.file_name().replace('"', "")),
            ));
        }

        if request.method == GatewayMethod::Head {
            headers.push(("Content-Length", total.to_string()));
            return Ok(StreamResponse {
                status: 200,
                headers,
                body: None,
            });
        }

        let (status, start, length) = match (request.range, request.endpoint) {
            (Some(range), _) => {
                let (start, length) = plan_range(range, total)?;
                headers.push((
                    "Content-Range",
                    format!("bytes {}-{}/{}", start, start + length - 1, total),
                ));
                (206, start, length)
            }
            (None, Endpoint::Stream) => {
                return Err(GatewayError::RangeNotSatisfiable {
                    total,
                    reason: "streaming requires a Range header".to_string(),
                })
            }
            (None, Endpoint::Download) => (200, 0, total),
        };
        headers.push(("Content-Length", length.to_string()));

        Ok(StreamResponse {
            status,
            headers,
            body: Some(ByteSlice {
                path,
                start,
                length,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_range_arithmetic() {
        assert_eq!(plan_range("bytes=100-199", 1000).unwrap(), (100, 100));
        assert_eq!(plan_range("bytes=900-", 1000).unwrap(), (900, 100));
        assert_eq!(plan_range("bytes=0-0", 1000).unwrap(), (0, 1));
        assert_eq!(plan_range("bytes=-50", 1000).unwrap(), (950, 50));
    }

    #[test]
    fn end_past_the_file_is_clamped() {
        assert_eq!(plan_range("bytes=990-5000", 1000).unwrap(), (990, 10));
    }

    #[test]
    fn bad_ranges_are_416() {
        for header in ["bytes=abc", "items=0-10", "bytes=2000-2100", "bytes=0-1,5-9"] {
            let err = plan_range(header, 1000).unwrap_err();
            assert_eq!(err.status(), 416, "{}", header);
            assert_eq!(err.content_range().as_deref(), Some("bytes */1000"));
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(GatewayError::MissingId.status(), 400);
        assert_eq!(GatewayError::InvalidType("x".into()).status(), 400);
        assert_eq!(GatewayError::Unauthorized.status(), 401);
        assert_eq!(GatewayError::Forbidden.status(), 403);
        assert_eq!(GatewayError::NotFound("x".into()).status(), 404);
        assert_eq!(GatewayError::MissingOnDisk("x".into()).status(), 404);
    }
}
