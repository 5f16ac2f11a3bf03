mod error;
mod process;

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::progress::{self, ProgressSample};

pub use error::{SupervisorError, SupervisorResult};
pub use process::{
    subtitle_filter, EncoderExit, EncoderInvocation, EncoderLauncher, EncoderProcess,
    ProgressStream, SystemEncoderLauncher,
};

const LINE_BUFFER: usize = 64;

/// Lifecycle of one supervised encoder run. A run only exists once the
/// process has been launched, so it starts in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

pub struct ProcessSupervisor {
    launcher: Arc<dyn EncoderLauncher>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor").finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(launcher: Option<Arc<dyn EncoderLauncher>>) -> Self {
        let launcher = launcher.unwrap_or_else(|| Arc::new(SystemEncoderLauncher));
        Self { launcher }
    }

    pub async fn start(&self, invocation: &EncoderInvocation) -> SupervisorResult<SupervisedRun> {
        let process = self
            .launcher
            .launch(invocation)
            .await
            .map_err(|source| SupervisorError::Launch {
                program: invocation.program.display().to_string(),
                source,
            })?;
        info!(
            video = %invocation.video.display(),
            output = %invocation.output.display(),
            "encoder started"
        );
        Ok(SupervisedRun {
            process,
            state: RunState::Running,
            started: Instant::now(),
        })
    }
}

/// Handle to a launched encoder.
pub struct SupervisedRun {
    process: Box<dyn EncoderProcess>,
    state: RunState,
    started: Instant,
}

impl fmt::Debug for SupervisedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedRun")
            .field("state", &self.state)
            .field("started", &self.started)
            .finish()
    }
}

enum Step {
    Cancelled,
    Line(Option<std::io::Result<String>>),
}

impl SupervisedRun {
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Consumes the progress stream until the encoder exits, calling
    /// `observer` once per timestamped line. Cancelling `cancel` kills the
    /// encoder before this returns `SupervisorError::Interrupted`.
    pub async fn drive<F>(
        &mut self,
        total_duration: f64,
        cancel: &CancellationToken,
        mut observer: F,
    ) -> SupervisorResult<()>
    where
        F: FnMut(ProgressSample) + Send,
    {
        if self.state.is_terminal() {
            return Err(SupervisorError::NotRunning(self.state));
        }
        let Some(stream) = self.process.take_progress() else {
            self.terminate().await;
            self.state = RunState::Failed;
            return Err(SupervisorError::StreamLost(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder progress stream unavailable",
            )));
        };

        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        let reader = tokio::spawn(forward_lines(stream, tx));
        let result = self
            .pump(&mut rx, total_duration, cancel, &mut observer)
            .await;
        reader.abort();
        result
    }

    async fn pump<F>(
        &mut self,
        rx: &mut mpsc::Receiver<std::io::Result<String>>,
        total_duration: f64,
        cancel: &CancellationToken,
        observer: &mut F,
    ) -> SupervisorResult<()>
    where
        F: FnMut(ProgressSample) + Send,
    {
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                message = rx.recv() => Step::Line(message),
            };
            match step {
                Step::Cancelled => return self.interrupt().await,
                Step::Line(Some(Ok(line))) => {
                    if let Some(sample) =
                        progress::estimate(&line, total_duration, self.started.elapsed())
                    {
                        observer(sample);
                    }
                }
                Step::Line(Some(Err(source))) => {
                    self.terminate().await;
                    self.state = RunState::Failed;
                    return Err(SupervisorError::StreamLost(source));
                }
                Step::Line(None) => break,
            }
        }

        let exit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            exit = self.process.wait() => Some(exit),
        };
        match exit {
            None => self.interrupt().await,
            Some(Ok(exit)) if exit.success() => {
                self.state = RunState::Completed;
                info!(elapsed = ?self.started.elapsed(), "encoder completed");
                Ok(())
            }
            Some(Ok(exit)) => {
                self.state = RunState::Failed;
                warn!(code = ?exit.code, "encoder exited with failure");
                Err(SupervisorError::Encode {
                    code: exit.code,
                    diagnostics: exit.diagnostics,
                })
            }
            Some(Err(source)) => {
                self.state = RunState::Failed;
                Err(SupervisorError::StreamClosed(source))
            }
        }
    }

    async fn interrupt(&mut self) -> SupervisorResult<()> {
        self.terminate().await;
        self.state = RunState::Interrupted;
        warn!("encoder run interrupted");
        Err(SupervisorError::Interrupted)
    }

    async fn terminate(&mut self) {
        if let Err(error) = self.process.terminate().await {
            debug!(%error, "encoder termination reported an error");
        }
    }
}

async fn forward_lines(stream: ProgressStream, tx: mpsc::Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                let _ = tx.send(Err(error)).await;
                break;
            }
        }
    }
}
