use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::EncoderSection;

/// Readable side of the encoder's `-progress` output.
pub type ProgressStream = Box<dyn AsyncRead + Send + Unpin>;

const DIAGNOSTICS_LIMIT: usize = 4096;

/// Everything needed to launch one encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInvocation {
    pub program: PathBuf,
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub output: PathBuf,
    pub log_level: String,
    pub extra_args: Vec<String>,
}

impl EncoderInvocation {
    pub fn new(
        encoder: &EncoderSection,
        video: impl Into<PathBuf>,
        subtitle: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: encoder.ffmpeg.clone(),
            video: video.into(),
            subtitle: subtitle.into(),
            output: output.into(),
            log_level: encoder.log_level.clone(),
            extra_args: encoder.extra_args.clone(),
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            self.log_level.clone().into(),
            "-progress".into(),
            "pipe:1".into(),
            "-i".into(),
            self.video.clone().into_os_string(),
            "-vf".into(),
            subtitle_filter(&self.subtitle).into(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// Builds the `subtitles=` video filter for `path`. The path is escaped once
/// for the filter option parser and once more for the filtergraph parser.
pub fn subtitle_filter(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut option = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(c);
    }
    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    format!("subtitles={graph}")
}

/// Final status of an encoder process. `code` is `None` when the process was
/// ended by a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderExit {
    pub code: Option<i32>,
    pub diagnostics: String,
}

impl EncoderExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait::async_trait]
pub trait EncoderProcess: Send {
    /// Hands out the progress stream; `None` once it has been taken.
    fn take_progress(&mut self) -> Option<ProgressStream>;
    async fn wait(&mut self) -> std::io::Result<EncoderExit>;
    /// Stops the process and reaps it.
    async fn terminate(&mut self) -> std::io::Result<()>;
}

#[async_trait::async_trait]
pub trait EncoderLauncher: Send + Sync {
    async fn launch(
        &self,
        invocation: &EncoderInvocation,
    ) -> std::io::Result<Box<dyn EncoderProcess>>;
}

#[derive(Debug, Default)]
pub struct SystemEncoderLauncher;

#[async_trait::async_trait]
impl EncoderLauncher for SystemEncoderLauncher {
    async fn launch(
        &self,
        invocation: &EncoderInvocation,
    ) -> std::io::Result<Box<dyn EncoderProcess>> {
        let mut command = Command::new(&invocation.program);
        command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn()?;
        debug!(pid = child.id(), program = %invocation.program.display(), "encoder spawned");
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                if let Err(error) = pipe.read_to_end(&mut buffer).await {
                    debug!(%error, "failed to drain encoder stderr");
                }
                tail(&String::from_utf8_lossy(&buffer), DIAGNOSTICS_LIMIT)
            })
        });
        Ok(Box::new(SystemEncoderProcess { child, stderr }))
    }
}

struct SystemEncoderProcess {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

#[async_trait::async_trait]
impl EncoderProcess for SystemEncoderProcess {
    fn take_progress(&mut self) -> Option<ProgressStream> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as ProgressStream)
    }

    async fn wait(&mut self) -> std::io::Result<EncoderExit> {
        let status = self.child.wait().await?;
        let diagnostics = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        Ok(EncoderExit {
            code: status.code(),
            diagnostics,
        })
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
        self.child.kill().await
    }
}

fn tail(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= limit {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - limit;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
