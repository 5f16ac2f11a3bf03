use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read subburn config {path}: {source}")]
    Unreadable {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid subburn config {path}: {source}")]
    Invalid {
        source: toml::de::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubburnConfig {
    #[serde(default)]
    pub encoder: EncoderSection,
    #[serde(default)]
    pub files: FilesSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub log_level: String,
    pub extra_args: Vec<String>,
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            log_level: "error".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub video_extension: String,
    pub subtitle_extension: String,
    pub output_suffix: String,
    pub cache_prefix: String,
    pub cache_dir: PathBuf,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            video_extension: "mp4".to_string(),
            subtitle_extension: "srt".to_string(),
            output_suffix: "-with_subtitles".to_string(),
            cache_prefix: "utf8_".to_string(),
            cache_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub subfolder: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            subfolder: "output".to_string(),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> ConfigResult<SubburnConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> ConfigResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Invalid {
        source,
        path: path.to_path_buf(),
    })
}
