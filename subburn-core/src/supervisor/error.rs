use thiserror::Error;

use super::RunState;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to launch encoder {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("encoder exited with status {code:?}: {diagnostics}")]
    Encode {
        code: Option<i32>,
        diagnostics: String,
    },
    #[error("encoder exit status unavailable after progress stream closed: {0}")]
    StreamClosed(std::io::Error),
    #[error("progress stream read failed: {0}")]
    StreamLost(std::io::Error),
    #[error("encoder run interrupted")]
    Interrupted,
    #[error("run is not active (state {0:?})")]
    NotRunning(RunState),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
