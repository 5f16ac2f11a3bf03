use std::path::PathBuf;

use thiserror::Error;

use crate::batch::BatchError;
use crate::encoding::NormalizeError;
use crate::guard::GuardError;
use crate::probe::ProbeError;
use crate::supervisor::SupervisorError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("subtitle encoding failed: {0}")]
    Encoding(#[from] NormalizeError),
    #[error("file format {extension:?} not supported, expected .{expected}")]
    UnsupportedFormat { extension: String, expected: String },
    #[error("metadata probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("encoder could not start: {0}")]
    Launch(String),
    #[error("encoder exited with status {code:?}: {diagnostics}")]
    Encode {
        code: Option<i32>,
        diagnostics: String,
    },
    #[error("encoder failed: {0}")]
    StreamClosed(String),
    #[error("no .{extension} files found in {path}")]
    EmptyInput { path: PathBuf, extension: String },
    #[error("interrupted by operator")]
    Interrupted,
}

impl JobError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, JobError::Interrupted)
    }
}

impl From<SupervisorError> for JobError {
    fn from(error: SupervisorError) -> Self {
        match error {
            SupervisorError::Launch { .. } => JobError::Launch(error.to_string()),
            SupervisorError::Encode { code, diagnostics } => JobError::Encode { code, diagnostics },
            SupervisorError::Interrupted => JobError::Interrupted,
            SupervisorError::StreamClosed(_)
            | SupervisorError::StreamLost(_)
            | SupervisorError::NotRunning(_) => JobError::StreamClosed(error.to_string()),
        }
    }
}

impl From<GuardError> for JobError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::Io { source, path } => JobError::Io { source, path },
        }
    }
}

impl From<BatchError> for JobError {
    fn from(error: BatchError) -> Self {
        match error {
            BatchError::Io { source, path } => JobError::Io { source, path },
            BatchError::EmptyInput { path, extension } => JobError::EmptyInput { path, extension },
        }
    }
}

pub type JobResult<T> = Result<T, JobError>;
