use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Folder,
    Link,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::File => "file",
            EntryType::Folder => "folder",
            EntryType::Link => "link",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntryType::File),
            "folder" => Ok(EntryType::Folder),
            "link" => Ok(EntryType::Link),
            other => Err(format!("unknown entry type '{}'", other)),
        }
    }
}

/// Filesystem facts recorded for an entry. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EntryMeta {
    #[serde(rename_all = "camelCase")]
    Timestamps {
        created: Option<i64>,
        modified: Option<i64>,
    },
    /// Node reached through a symlinked directory; `real_path` is where it lives on disk.
    #[serde(rename_all = "camelCase")]
    Phantom {
        created: Option<i64>,
        modified: Option<i64>,
        real_path: String,
    },
    #[serde(rename_all = "camelCase")]
    Symlink {
        created: Option<i64>,
        modified: Option<i64>,
        symlink_target: String,
    },
    #[serde(rename_all = "camelCase")]
    Broken {
        created: Option<i64>,
        modified: Option<i64>,
    },
}

impl EntryMeta {
    pub fn real_path(&self) -> Option<&str> {
        match self {
            EntryMeta::Phantom { real_path, .. } => Some(real_path),
            _ => None,
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, EntryMeta::Broken { .. })
    }
}

/// One row of the filesystem catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub path: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub meta: EntryMeta,
    pub parent_id: Option<String>,
    pub is_phantom_symlink: bool,
}

impl Entry {
    /// Where the bytes of this entry live; phantom entries point at their real target.
    pub fn disk_path(&self) -> &str {
        self.meta.real_path().unwrap_or(&self.path)
    }

    pub fn file_name(&self) -> &str {
        std::path::Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub entry_type: Option<EntryType>,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            entry_type: None,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct FilePassword {
    pub file_id: String,
    pub password_hash: String,
    pub created_at: String,
}

/// Which catalog a corrupted-file marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionSet {
    Video,
    Audio,
}

impl CorruptionSet {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            CorruptionSet::Video => "corrupted_files",
            CorruptionSet::Audio => "corrupted_audio_files",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMedia {
    pub id: String,
    pub entry_id: String,
    pub media_type: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub frame_rate: Option<f64>,
    pub aspect_ratio: Option<String>,
    pub quality: Option<String>,
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub video_media_id: String,
    pub position: u32,
    pub timestamp: f64,
    pub frame: Vec<u8>,
}

/// Colours sampled from a 10x10 downscale of one frame, as `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteColors {
    pub top_left: String,
    pub top_right: String,
    pub bottom_left: String,
    pub bottom_right: String,
    pub center: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoColorPalette {
    pub video_media_id: String,
    pub position: u32,
    pub timestamp: f64,
    pub colors: PaletteColors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub id: String,
    pub entry_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub year: Option<i32>,
    pub genre: String,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disk_number: Option<u32>,
    pub disk_total: Option<u32>,
    pub duration: Option<f64>,
    pub bitrate: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub codec: Option<String>,
    #[serde(skip)]
    pub cover_art: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub artist: String,
    pub year: Option<i32>,
    pub track_count: i64,
    pub total_duration: f64,
    pub cover_track_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub album_count: i64,
    pub track_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub id: i64,
    pub name: String,
    pub track_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_serializes_with_kind_tag() {
        let meta = EntryMeta::Symlink {
            created: None,
            modified: Some(5),
            symlink_target: "/real/file".to_string(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains(r#""kind":"symlink""#));
        assert!(json.contains(r#""symlinkTarget":"/real/file""#));
        let back: EntryMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn disk_path_prefers_real_path() {
        let entry = Entry {
            id: "a".into(),
            entry_type: EntryType::File,
            path: "/virtual/clip.mp4".into(),
            size: Some(1),
            mime_type: None,
            comment: None,
            tags: vec![],
            meta: EntryMeta::Phantom {
                created: None,
                modified: None,
                real_path: "/real/clip.mp4".into(),
            },
            parent_id: None,
            is_phantom_symlink: true,
        };
        assert_eq!(entry.disk_path(), "/real/clip.mp4");
        assert_eq!(entry.file_name(), "clip.mp4");
    }
}
