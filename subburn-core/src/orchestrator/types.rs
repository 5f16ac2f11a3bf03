use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::guard::OverwritePolicy;
use crate::probe::MediaMetadata;
use crate::report::SubtitleFile;

/// One unit of work: burn `subtitle` into `video`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub video: PathBuf,
    pub subtitle: PathBuf,
    /// Parent of the output subfolder.
    pub directory: PathBuf,
    pub output_subfolder: String,
    /// Only the file name part is used.
    pub output_name: Option<String>,
    pub overwrite: OverwritePolicy,
    pub encoding: Option<String>,
}

impl JobSpec {
    /// A job writing next to the video, in `<video dir>/<subfolder>/`.
    pub fn beside_video(
        video: impl Into<PathBuf>,
        subtitle: impl Into<PathBuf>,
        output_subfolder: impl Into<String>,
    ) -> Self {
        let video = video.into();
        let directory = video
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            video,
            subtitle: subtitle.into(),
            directory,
            output_subfolder: output_subfolder.into(),
            output_name: None,
            overwrite: OverwritePolicy::Prompt,
            encoding: None,
        }
    }

    pub fn with_output_name(mut self, name: Option<String>) -> Self {
        self.output_name = name;
        self
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.directory.join(&self.output_subfolder)
    }
}

/// Options shared by every pair of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub output_subfolder: String,
    pub overwrite: OverwritePolicy,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub video: PathBuf,
    pub subtitle: SubtitleFile,
    pub output: PathBuf,
    pub metadata: MediaMetadata,
    pub elapsed_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed(JobReport),
    Skipped { output: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPair {
    pub video: String,
    pub subtitle: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub directory: PathBuf,
    pub completed: Vec<JobReport>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedPair>,
    pub unmatched: Vec<String>,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}
