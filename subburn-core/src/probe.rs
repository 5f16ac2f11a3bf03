use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::command::{CommandExecutor, SystemCommandExecutor};

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("invalid ffprobe payload: {0}")]
    Parse(String),
    #[error("video stream metadata not available")]
    MissingVideoStream,
    #[error("probe document lacks {0}")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for ProbeError {
    fn from(source: serde_json::Error) -> Self {
        ProbeError::Parse(source.to_string())
    }
}

/// Structural facts about a video, read once before encoding starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub video_codec: String,
    pub video_bitrate_kbps: f64,
    pub audio_codec: String,
    pub audio_bitrate_kbps: f64,
    pub audio_channels: Option<u32>,
}

impl MediaMetadata {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn audio_channels_label(&self) -> String {
        self.audio_channels
            .map(|channels| channels.to_string())
            .unwrap_or_else(|| Self::UNKNOWN.to_string())
    }

    pub fn from_document(document: &ProbeDocument) -> ProbeResult<Self> {
        let duration = document
            .format
            .duration
            .as_deref()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value >= 0.0)
            .ok_or(ProbeError::MissingField("format.duration"))?;
        let video = document
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("video"))
            .ok_or(ProbeError::MissingVideoStream)?;
        let audio = document
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("audio"));

        let width = video
            .width
            .filter(|w| *w > 0)
            .ok_or(ProbeError::MissingField("video width"))?;
        let height = video
            .height
            .filter(|h| *h > 0)
            .ok_or(ProbeError::MissingField("video height"))?;
        let frame_rate = parse_rate(video.r_frame_rate.as_deref())
            .or_else(|| parse_rate(video.avg_frame_rate.as_deref()))
            .filter(|fps| *fps > 0.0)
            .ok_or(ProbeError::MissingField("video frame rate"))?;

        Ok(Self {
            duration,
            width,
            height,
            frame_rate,
            video_codec: video
                .codec_name
                .clone()
                .unwrap_or_else(|| Self::UNKNOWN.to_string()),
            video_bitrate_kbps: bitrate_kbps(video.bit_rate.as_deref()),
            audio_codec: audio
                .and_then(|stream| stream.codec_name.clone())
                .unwrap_or_else(|| Self::UNKNOWN.to_string()),
            audio_bitrate_kbps: audio
                .map(|stream| bitrate_kbps(stream.bit_rate.as_deref()))
                .unwrap_or(0.0),
            audio_channels: audio.and_then(|stream| stream.channels),
        })
    }
}

/// The subset of `ffprobe -print_format json -show_streams -show_format`
/// that metadata is built from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeDocument {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    #[serde(default)]
    pub format: ProbeFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    pub r_frame_rate: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    #[serde(default)]
    pub duration: Option<String>,
}

#[async_trait::async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, video: &Path) -> ProbeResult<ProbeDocument>;
}

/// Queries `ffprobe` for a JSON description of the video.
pub struct FfprobeProbe {
    program: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for FfprobeProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfprobeProbe")
            .field("program", &self.program)
            .finish()
    }
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            program: program.into(),
            executor,
        }
    }
}

#[async_trait::async_trait]
impl MetadataProbe for FfprobeProbe {
    async fn probe(&self, video: &Path) -> ProbeResult<ProbeDocument> {
        let mut command = Command::new(&self.program);
        command
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-show_format")
            .arg(video);
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| ProbeError::Io {
                source,
                path: video.to_path_buf(),
            })?;
        if !output.status.success() {
            return Err(ProbeError::CommandFailure {
                command: format!("{} {}", self.program.display(), video.display()),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        let document: ProbeDocument = serde_json::from_slice(&output.stdout)?;
        debug!(
            video = %video.display(),
            streams = document.streams.len(),
            "probe document received"
        );
        Ok(document)
    }
}

fn bitrate_kbps(value: Option<&str>) -> f64 {
    value
        .and_then(|bits| bits.parse::<f64>().ok())
        .map(|bits| bits / 1000.0)
        .unwrap_or(0.0)
}

fn parse_rate(rate: Option<&str>) -> Option<f64> {
    let rate = rate?;
    if rate.contains('/') {
        let mut parts = rate.split('/');
        let numerator = parts.next()?.parse::<f64>().ok()?;
        let denominator = parts.next()?.parse::<f64>().ok()?;
        if denominator == 0.0 {
            return None;
        }
        Some(numerator / denominator)
    } else {
        rate.parse::<f64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const FULL: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "24000/1001", "avg_frame_rate": "24000/1001", "bit_rate": "4500000"},
            {"codec_type": "audio", "codec_name": "aac", "channels": 2, "bit_rate": "128000"}
        ],
        "format": {"duration": "1325.400000", "bit_rate": "4630000"}
    }"#;

    #[test]
    fn builds_metadata_from_document() {
        let document: ProbeDocument = serde_json::from_str(FULL).unwrap();
        let metadata = MediaMetadata::from_document(&document).unwrap();
        assert_eq!(metadata.duration, 1325.4);
        assert_eq!(metadata.resolution(), "1920x1080");
        assert!((metadata.frame_rate - 23.976).abs() < 0.001);
        assert_eq!(metadata.video_codec, "h264");
        assert_eq!(metadata.video_bitrate_kbps, 4500.0);
        assert_eq!(metadata.audio_codec, "aac");
        assert_eq!(metadata.audio_bitrate_kbps, 128.0);
        assert_eq!(metadata.audio_channels, Some(2));
    }

    #[test]
    fn missing_audio_is_unknown() {
        let document: ProbeDocument = serde_json::from_str(
            r#"{"streams": [{"codec_type": "video", "codec_name": "hevc", "width": 640,
                "height": 360, "r_frame_rate": "25/1"}], "format": {"duration": "10"}}"#,
        )
        .unwrap();
        let metadata = MediaMetadata::from_document(&document).unwrap();
        assert_eq!(metadata.audio_codec, "unknown");
        assert_eq!(metadata.audio_channels_label(), "unknown");
        assert_eq!(metadata.audio_bitrate_kbps, 0.0);
        assert_eq!(metadata.video_bitrate_kbps, 0.0);
    }

    #[test]
    fn missing_video_stream_is_rejected() {
        let document: ProbeDocument = serde_json::from_str(
            r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "10"}}"#,
        )
        .unwrap();
        assert!(matches!(
            MediaMetadata::from_document(&document),
            Err(ProbeError::MissingVideoStream)
        ));
    }

    struct CannedExecutor {
        stdout: Vec<u8>,
        raw_status: i32,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CommandExecutor for CannedExecutor {
        async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{:?}", command.as_std()));
            Ok(std::process::Output {
                status: exit_status(self.raw_status),
                stdout: self.stdout.clone(),
                stderr: b"boom".to_vec(),
            })
        }
    }

    #[cfg(unix)]
    fn exit_status(raw: i32) -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(raw)
    }

    #[cfg(windows)]
    fn exit_status(raw: i32) -> std::process::ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(raw as u32)
    }

    #[tokio::test]
    async fn ffprobe_output_is_parsed() {
        let executor = Arc::new(CannedExecutor {
            stdout: FULL.as_bytes().to_vec(),
            raw_status: 0,
            seen: Mutex::new(Vec::new()),
        });
        let probe = FfprobeProbe::new(
            "ffprobe",
            Some(executor.clone() as Arc<dyn CommandExecutor>),
        );
        let document = probe.probe(Path::new("/media/ep1.mp4")).await.unwrap();
        assert_eq!(document.streams.len(), 2);
        let seen = executor.seen.lock().unwrap();
        assert!(seen[0].contains("-show_streams"));
        assert!(seen[0].contains("/media/ep1.mp4"));
    }

    #[tokio::test]
    async fn ffprobe_failure_carries_stderr() {
        let executor = Arc::new(CannedExecutor {
            stdout: Vec::new(),
            raw_status: 1 << 8,
            seen: Mutex::new(Vec::new()),
        });
        let probe = FfprobeProbe::new("ffprobe", Some(executor as Arc<dyn CommandExecutor>));
        let err = probe.probe(Path::new("/media/ep1.mp4")).await.unwrap_err();
        match err {
            ProbeError::CommandFailure { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
