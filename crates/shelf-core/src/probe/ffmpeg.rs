use super::process::run_tool;
use super::{AudioProbe, FrameKind, MediaProber, ProbeError, VideoProbe};
use crate::config::AppConfig;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// `ffprobe`/`ffmpeg` backed prober.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
    quick_timeout: Duration,
}

impl Ffmpeg {
    pub fn new(
        ffprobe: impl Into<PathBuf>,
        ffmpeg: impl Into<PathBuf>,
        quick_timeout: Duration,
    ) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
            quick_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.ffprobe_path,
            &config.ffmpeg_path,
            config.quick_probe_timeout(),
        )
    }

    fn probe_json(&self, path: &Path, deadline: Option<Duration>) -> Result<Vec<u8>, ProbeError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);
        run_tool(cmd, "ffprobe", deadline)
    }
}

impl MediaProber for Ffmpeg {
    fn has_video_stream(&self, path: &Path) -> Result<bool, ProbeError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "csv=p=0",
        ])
        .arg(path);
        let out = run_tool(cmd, "ffprobe", Some(self.quick_timeout))?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .any(|line| line.trim() == "video"))
    }

    fn probe_video(&self, path: &Path) -> Result<VideoProbe, ProbeError> {
        let out = self.probe_json(path, None)?;
        parse_video_probe(&out)
    }

    fn extract_frame(
        &self,
        path: &Path,
        at_secs: f64,
        kind: FrameKind,
    ) -> Result<Vec<u8>, ProbeError> {
        let (filter, codec) = match kind {
            FrameKind::Thumbnail => ("scale=480:-2", "mjpeg"),
            FrameKind::Grid => ("scale=240:-2", "mjpeg"),
            FrameKind::Swatch => ("scale=10:10", "png"),
        };
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-nostdin", "-loglevel", "error", "-ss"])
            .arg(format!("{:.3}", at_secs.max(0.0)))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-vf", filter, "-f", "image2pipe", "-c:v", codec, "-"]);
        let out = run_tool(cmd, "ffmpeg", None)?;
        if out.is_empty() {
            return Err(ProbeError::Missing(format!(
                "no frame at {:.3}s in {}",
                at_secs,
                path.display()
            )));
        }
        Ok(out)
    }

    fn probe_audio(&self, path: &Path) -> Result<AudioProbe, ProbeError> {
        let out = self.probe_json(path, Some(self.quick_timeout))?;
        parse_audio_probe(&out)
    }

    fn extract_cover_art(&self, path: &Path) -> Result<Option<Vec<u8>>, ProbeError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-nostdin", "-loglevel", "error", "-i"])
            .arg(path)
            .args([
                "-an", "-map", "0:v:0", "-frames:v", "1", "-f", "image2pipe", "-c:v", "mjpeg", "-",
            ]);
        let out = run_tool(cmd, "ffmpeg", None)?;
        Ok((!out.is_empty()).then_some(out))
    }
}

// ── ffprobe JSON ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfStream>,
    format: Option<FfFormat>,
}

#[derive(Debug, Deserialize)]
struct FfStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    display_aspect_ratio: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl FfStream {
    fn is(&self, codec_type: &str) -> bool {
        self.codec_type.as_deref() == Some(codec_type)
    }

    fn is_attached_picture(&self) -> bool {
        self.disposition.get("attached_pic").copied().unwrap_or(0) == 1
    }
}

#[derive(Debug, Deserialize)]
struct FfFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn positive_f64(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// `"30000/1001"` → 29.97. Zero denominators and non-positive rates are absent.
pub fn parse_rational(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn lowercase_keys(tags: &HashMap<String, String>) -> BTreeMap<String, String> {
    tags.iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

fn valid_aspect(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((w, h)) => matches!(
            (w.parse::<u32>(), h.parse::<u32>()),
            (Ok(w), Ok(h)) if w > 0 && h > 0
        ),
        None => false,
    }
}

pub fn parse_video_probe(json: &[u8]) -> Result<VideoProbe, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(json)?;
    let stream = output
        .streams
        .iter()
        .find(|s| s.is("video") && !s.is_attached_picture());
    let format_tags = output
        .format
        .as_ref()
        .map(|f| lowercase_keys(&f.tags))
        .unwrap_or_default();

    let duration = output
        .format
        .as_ref()
        .and_then(|f| positive_f64(f.duration.as_deref()))
        .or_else(|| stream.and_then(|s| positive_f64(s.duration.as_deref())));

    let width = stream.and_then(|s| s.width).filter(|w| *w > 0);
    let height = stream.and_then(|s| s.height).filter(|h| *h > 0);
    let frame_rate = stream.and_then(|s| {
        s.avg_frame_rate
            .as_deref()
            .and_then(parse_rational)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rational))
    });
    let aspect_ratio = stream
        .and_then(|s| s.display_aspect_ratio.clone())
        .filter(|r| valid_aspect(r));

    Ok(VideoProbe {
        duration,
        width,
        height,
        codec: stream.and_then(|s| s.codec_name.clone()),
        frame_rate,
        aspect_ratio,
        title: format_tags.get("title").cloned().filter(|t| !t.trim().is_empty()),
        comment: format_tags
            .get("comment")
            .or_else(|| format_tags.get("description"))
            .cloned()
            .filter(|c| !c.trim().is_empty()),
    })
}

pub fn parse_audio_probe(json: &[u8]) -> Result<AudioProbe, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(json)?;
    let stream = output
        .streams
        .iter()
        .find(|s| s.is("audio"))
        .ok_or_else(|| ProbeError::Missing("no audio stream".to_string()))?;

    // Container tags win over stream tags (Ogg/FLAC keep theirs on the stream).
    let mut tags = lowercase_keys(&stream.tags);
    if let Some(format) = &output.format {
        tags.extend(lowercase_keys(&format.tags));
    }

    let bitrate = output
        .format
        .as_ref()
        .and_then(|f| f.bit_rate.as_deref())
        .or(stream.bit_rate.as_deref())
        .and_then(|b| b.trim().parse::<u64>().ok())
        .filter(|b| *b > 0);

    Ok(AudioProbe {
        duration: output
            .format
            .as_ref()
            .and_then(|f| positive_f64(f.duration.as_deref()))
            .or_else(|| positive_f64(stream.duration.as_deref())),
        bitrate,
        sample_rate: stream
            .sample_rate
            .as_deref()
            .and_then(|r| r.trim().parse().ok()),
        channels: stream.channels,
        codec: stream.codec_name.clone(),
        tags,
        has_cover_art: output.streams.iter().any(|s| s.is_attached_picture()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "h264", "codec_type": "video", "width": 1920, "height": 1080,
             "display_aspect_ratio": "16:9",
             "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001",
             "disposition": {"default": 1, "attached_pic": 0}},
            {"index": 1, "codec_name": "aac", "codec_type": "audio",
             "sample_rate": "48000", "channels": 2}
        ],
        "format": {"duration": "125.400000", "bit_rate": "4000000",
                   "tags": {"TITLE": "Holiday", "comment": "Beach day"}}
    }"#;

    const AUDIO_JSON: &str = r#"{
        "streams": [
            {"codec_name": "flac", "codec_type": "audio", "sample_rate": "44100", "channels": 2,
             "tags": {"ARTIST": "Stream Artist", "GENRE": "Jazz"}},
            {"codec_name": "mjpeg", "codec_type": "video", "width": 500, "height": 500,
             "disposition": {"attached_pic": 1}}
        ],
        "format": {"duration": "241.5", "bit_rate": "912000",
                   "tags": {"ARTIST": "Format Artist", "album": "Blue", "track": "3/12"}}
    }"#;

    #[test]
    fn rational_frame_rates() {
        let ntsc = parse_rational("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("25/1"), Some(25.0));
        assert_eq!(parse_rational("24"), Some(24.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("N/A"), None);
    }

    #[test]
    fn video_probe_fields() {
        let probe = parse_video_probe(VIDEO_JSON.as_bytes()).unwrap();
        assert_eq!(probe.duration, Some(125.4));
        assert_eq!(probe.width, Some(1920));
        assert_eq!(probe.height, Some(1080));
        assert_eq!(probe.codec.as_deref(), Some("h264"));
        assert_eq!(probe.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(probe.title.as_deref(), Some("Holiday"));
        assert_eq!(probe.comment.as_deref(), Some("Beach day"));
        assert!(probe.frame_rate.is_some());
    }

    #[test]
    fn video_probe_without_video_stream_has_no_codec() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}],
                       "format": {"duration": "10.0"}}"#;
        let probe = parse_video_probe(json.as_bytes()).unwrap();
        assert_eq!(probe.duration, Some(10.0));
        assert!(probe.codec.is_none());
        assert!(probe.width.is_none());
    }

    #[test]
    fn cover_art_stream_is_not_the_video_stream() {
        let probe = parse_video_probe(AUDIO_JSON.as_bytes()).unwrap();
        assert!(probe.codec.is_none());
    }

    #[test]
    fn audio_probe_merges_tags() {
        let probe = parse_audio_probe(AUDIO_JSON.as_bytes()).unwrap();
        assert_eq!(probe.codec.as_deref(), Some("flac"));
        assert_eq!(probe.sample_rate, Some(44100));
        assert_eq!(probe.bitrate, Some(912000));
        assert!(probe.has_cover_art);
        assert_eq!(probe.tag(&["artist"]), Some("Format Artist"));
        assert_eq!(probe.tag(&["genre"]), Some("Jazz"));
        assert_eq!(probe.tag(&["tracknumber", "track"]), Some("3/12"));
    }

    #[test]
    fn audio_probe_requires_audio_stream() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "h264"}]}"#;
        assert!(matches!(
            parse_audio_probe(json.as_bytes()),
            Err(ProbeError::Missing(_))
        ));
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(matches!(
            parse_video_probe(b"not json"),
            Err(ProbeError::Output(_))
        ));
    }
}
