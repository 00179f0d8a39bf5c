//! External media inspection. Catalogs only talk to [`MediaProber`], so the
//! ffprobe/ffmpeg backend can be swapped out (tests use an in-memory fake).

pub mod ffmpeg;
mod process;

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use thiserror::Error;

pub use ffmpeg::Ffmpeg;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("unreadable probe output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Missing(String),
}

/// Container and stream facts for a video file. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoProbe {
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub frame_rate: Option<f64>,
    pub aspect_ratio: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

/// Stream facts and embedded tags for an audio file. Tag keys are lowercase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioProbe {
    pub duration: Option<f64>,
    pub bitrate: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub codec: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub has_cover_art: bool,
}

impl AudioProbe {
    /// First non-blank value among the given tag keys.
    pub fn tag(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.tags.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

/// What a single extracted frame is for; decides its size and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Representative still, JPEG.
    Thumbnail,
    /// Frame-grid cell, small JPEG.
    Grid,
    /// 10x10 PNG used for colour sampling.
    Swatch,
}

pub trait MediaProber: Send + Sync {
    /// Fast check that the file carries a video stream. Bounded by a timeout.
    fn has_video_stream(&self, path: &Path) -> Result<bool, ProbeError>;

    fn probe_video(&self, path: &Path) -> Result<VideoProbe, ProbeError>;

    /// One encoded frame at `at_secs`.
    fn extract_frame(&self, path: &Path, at_secs: f64, kind: FrameKind)
        -> Result<Vec<u8>, ProbeError>;

    /// Tag and stream parse for an audio file. Bounded by a timeout.
    fn probe_audio(&self, path: &Path) -> Result<AudioProbe, ProbeError>;

    fn extract_cover_art(&self, path: &Path) -> Result<Option<Vec<u8>>, ProbeError>;
}
