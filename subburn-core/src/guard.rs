use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type GuardResult<T> = Result<T, GuardError>;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("failed to remove {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// What to do with an output file that is in the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    Prompt,
    AutoDelete,
}

/// Operator reply to a delete confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    /// The operator interrupted again while the question was pending.
    Interrupted,
}

impl PromptAnswer {
    /// Maps a typed reply: only `y`/`Y` confirms.
    pub fn from_reply(reply: &str) -> Self {
        if reply.trim().eq_ignore_ascii_case("y") {
            PromptAnswer::Yes
        } else {
            PromptAnswer::No
        }
    }
}

/// Boundary that asks the operator whether `path` may be deleted.
#[async_trait::async_trait]
pub trait DeletePrompt: Send + Sync {
    async fn confirm_delete(&self, path: &Path) -> PromptAnswer;
}

/// Never confirms; used when nobody is there to answer.
#[derive(Debug, Default)]
pub struct DeclinePrompt;

#[async_trait::async_trait]
impl DeletePrompt for DeclinePrompt {
    async fn confirm_delete(&self, _path: &Path) -> PromptAnswer {
        PromptAnswer::No
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Output path is clear; carry on.
    Proceed,
    /// Leave the file alone.
    Abort,
    /// Delete the file; the operator interrupted while being asked.
    ForcedDelete,
}

impl Decision {
    pub fn deletes(&self) -> bool {
        !matches!(self, Decision::Abort)
    }
}

/// `answer` is only consulted under `OverwritePolicy::Prompt`.
pub fn decide(policy: OverwritePolicy, answer: Option<PromptAnswer>) -> Decision {
    match (policy, answer) {
        (OverwritePolicy::AutoDelete, _) => Decision::Proceed,
        (OverwritePolicy::Prompt, Some(PromptAnswer::Yes)) => Decision::Proceed,
        (OverwritePolicy::Prompt, Some(PromptAnswer::Interrupted)) => Decision::ForcedDelete,
        (OverwritePolicy::Prompt, Some(PromptAnswer::No) | None) => Decision::Abort,
    }
}

/// Result of the post-failure cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cleanup {
    NothingToClean,
    Deleted,
    Kept,
    ForcedDeleted,
}

pub struct OutputGuard {
    prompt: Arc<dyn DeletePrompt>,
}

impl fmt::Debug for OutputGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputGuard").finish_non_exhaustive()
    }
}

impl OutputGuard {
    pub fn new(prompt: Arc<dyn DeletePrompt>) -> Self {
        Self { prompt }
    }

    /// Clears the way for a new output file. `Abort` leaves an existing file
    /// intact; `ForcedDelete` means it was removed after a second interrupt.
    pub async fn resolve_pre_existing(
        &self,
        path: &Path,
        policy: OverwritePolicy,
    ) -> GuardResult<Decision> {
        if !path.exists() {
            return Ok(Decision::Proceed);
        }
        let decision = self.ask(path, policy).await;
        if decision.deletes() {
            remove(path)?;
            info!(path = %path.display(), ?decision, "removed existing output file");
        } else {
            warn!(path = %path.display(), "existing output file kept");
        }
        Ok(decision)
    }

    /// Disposes of a possibly partial output after a failed or interrupted
    /// run.
    pub async fn on_interrupt(&self, path: &Path, policy: OverwritePolicy) -> GuardResult<Cleanup> {
        if !path.exists() {
            return Ok(Cleanup::NothingToClean);
        }
        let cleanup = match self.ask(path, policy).await {
            Decision::Proceed => Cleanup::Deleted,
            Decision::ForcedDelete => Cleanup::ForcedDeleted,
            Decision::Abort => Cleanup::Kept,
        };
        match cleanup {
            Cleanup::Deleted | Cleanup::ForcedDeleted => {
                remove(path)?;
                info!(path = %path.display(), "deleted partial output file");
            }
            _ => warn!(path = %path.display(), "partial output file kept"),
        }
        Ok(cleanup)
    }

    async fn ask(&self, path: &Path, policy: OverwritePolicy) -> Decision {
        let answer = match policy {
            OverwritePolicy::AutoDelete => None,
            OverwritePolicy::Prompt => Some(self.prompt.confirm_delete(path).await),
        };
        decide(policy, answer)
    }
}

fn remove(path: &Path) -> GuardResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GuardError::Io {
            source,
            path: path.to_path_buf(),
        }),
    }
}
