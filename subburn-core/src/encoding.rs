use std::fs;
use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FilesSection;

/// Result alias for subtitle normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("unknown text encoding label: {0}")]
    UnknownEncoding(String),
}

/// Encoding picked for a subtitle file, either detected or supplied by the
/// operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedEncoding {
    encoding: &'static Encoding,
    manual: bool,
}

impl DetectedEncoding {
    pub fn label(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

/// Produces UTF-8 copies of subtitle files so the encoder's subtitle filter
/// never sees a legacy code page.
///
/// Converted files are cached as `<cache_dir>/<prefix><file name>`. A cached
/// file is reused as-is even when its source changed afterwards; delete the
/// cache file to force a fresh conversion.
#[derive(Debug, Clone)]
pub struct EncodingNormalizer {
    cache_dir: PathBuf,
    prefix: String,
}

impl EncodingNormalizer {
    pub fn new(cache_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_files_section(files: &FilesSection) -> Self {
        Self::new(files.cache_dir.clone(), files.cache_prefix.clone())
    }

    pub fn cache_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        self.cache_dir.join(format!("{}{}", self.prefix, name))
    }

    pub fn detect(&self, path: &Path, manual: Option<&str>) -> NormalizeResult<DetectedEncoding> {
        if let Some(label) = manual {
            return lookup_label(label).map(|encoding| DetectedEncoding {
                encoding,
                manual: true,
            });
        }
        let bytes = read_bytes(path)?;
        let encoding = classify(&bytes);
        debug!(path = %path.display(), encoding = encoding.name(), "detected subtitle encoding");
        Ok(DetectedEncoding {
            encoding,
            manual: false,
        })
    }

    pub fn normalize(&self, path: &Path, manual: Option<&str>) -> NormalizeResult<PathBuf> {
        let cached = self.cache_path(path);
        if cached.exists() {
            info!(path = %cached.display(), "reusing cached UTF-8 subtitle");
            return Ok(cached);
        }

        let detected = self.detect(path, manual)?;
        if detected.is_utf8() {
            debug!(path = %path.display(), "subtitle already UTF-8, no conversion needed");
            return Ok(path.to_path_buf());
        }

        let bytes = read_bytes(path)?;
        let (text, _, had_errors) = detected.encoding().decode(&bytes);
        if had_errors {
            debug!(
                path = %path.display(),
                encoding = detected.label(),
                "replaced undecodable byte sequences"
            );
        }
        fs::write(&cached, text.as_bytes()).map_err(|source| NormalizeError::Io {
            source,
            path: cached.clone(),
        })?;
        info!(
            source = %path.display(),
            target = %cached.display(),
            encoding = detected.label(),
            "converted subtitle to UTF-8"
        );
        Ok(cached)
    }

    /// Counts subtitle cues by their numeric index lines. Any line that is
    /// nothing but ASCII digits counts, so a cue whose text is a bare number
    /// is counted twice.
    pub fn count_entries(&self, path: &Path) -> NormalizeResult<usize> {
        let bytes = read_bytes(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
            .count())
    }
}

fn lookup_label(label: &str) -> NormalizeResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| NormalizeError::UnknownEncoding(label.to_string()))
}

fn classify(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn read_bytes(path: &Path) -> NormalizeResult<Vec<u8>> {
    fs::read(path).map_err(|source| NormalizeError::Io {
        source,
        path: path.to_path_buf(),
    })
}
