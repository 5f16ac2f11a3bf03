//! Scripted stand-ins for the encoder, the probe and the operator prompt, so
//! whole jobs can run without external binaries or a terminal.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};

use crate::guard::{DeletePrompt, PromptAnswer};
use crate::probe::{MetadataProbe, ProbeDocument, ProbeError, ProbeFormat, ProbeResult, ProbeStream};
use crate::supervisor::{
    EncoderExit, EncoderInvocation, EncoderLauncher, EncoderProcess, ProgressStream,
};

/// Behaviour of one scripted encoder launch.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub lines: Vec<String>,
    /// `None` makes `wait` fail, as if the status could not be collected.
    pub exit_code: Option<i32>,
    /// Keep the progress stream open after the scripted lines.
    pub hang: bool,
    pub launch_fails: bool,
    /// Bytes written to the output path on launch.
    pub partial_output: Option<Vec<u8>>,
    pub stream: StreamScript,
}

/// How the progress stream of a scripted run behaves after its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamScript {
    #[default]
    Normal,
    /// `take_progress` returns `None`.
    Missing,
    /// Reading past the scripted lines fails with an I/O error.
    Broken,
}

impl ScriptedRun {
    pub fn succeeding(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            exit_code: Some(0),
            hang: false,
            launch_fails: false,
            partial_output: None,
            stream: StreamScript::Normal,
        }
    }

    pub fn hanging(lines: &[&str]) -> Self {
        Self {
            hang: true,
            ..Self::succeeding(lines)
        }
    }

    pub fn unlaunchable() -> Self {
        Self {
            launch_fails: true,
            ..Self::succeeding(&[])
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_stream(mut self, stream: StreamScript) -> Self {
        self.stream = stream;
        self
    }

    pub fn writing_output(mut self, bytes: &[u8]) -> Self {
        self.partial_output = Some(bytes.to_vec());
        self
    }
}

#[derive(Debug, Default)]
struct LaunchLog {
    invocations: Mutex<Vec<EncoderInvocation>>,
    terminations: AtomicUsize,
}

/// Plays back `ScriptedRun`s in order; the last one repeats.
#[derive(Debug)]
pub struct ScriptedLauncher {
    runs: Mutex<VecDeque<ScriptedRun>>,
    log: Arc<LaunchLog>,
}

impl ScriptedLauncher {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            log: Arc::new(LaunchLog::default()),
        }
    }

    pub fn invocations(&self) -> Vec<EncoderInvocation> {
        self.log
            .invocations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn terminations(&self) -> usize {
        self.log.terminations.load(Ordering::SeqCst)
    }

    fn next_run(&self) -> Option<ScriptedRun> {
        let mut runs = self.runs.lock().ok()?;
        if runs.len() > 1 {
            runs.pop_front()
        } else {
            runs.front().cloned()
        }
    }
}

#[async_trait::async_trait]
impl EncoderLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        invocation: &EncoderInvocation,
    ) -> std::io::Result<Box<dyn EncoderProcess>> {
        let run = self.next_run().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "no scripted run left")
        })?;
        if let Ok(mut invocations) = self.log.invocations.lock() {
            invocations.push(invocation.clone());
        }
        if run.launch_fails {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "scripted encoder missing",
            ));
        }
        if let Some(bytes) = &run.partial_output {
            tokio::fs::write(&invocation.output, bytes).await?;
        }

        let mut script = run.lines.join("\n");
        if !script.is_empty() {
            script.push('\n');
        }
        let mut process = ScriptedProcess {
            progress: None,
            writer: None,
            exit_code: run.exit_code,
            log: self.log.clone(),
        };
        match run.stream {
            StreamScript::Missing => {}
            StreamScript::Broken => {
                process.progress = Some(Box::new(BrokenStream {
                    pending: script.into_bytes(),
                }) as ProgressStream);
            }
            StreamScript::Normal => {
                let (mut writer, reader) = tokio::io::duplex(script.len().max(64));
                writer.write_all(script.as_bytes()).await?;
                if run.hang {
                    process.writer = Some(writer);
                }
                process.progress = Some(Box::new(reader) as ProgressStream);
            }
        }
        Ok(Box::new(process))
    }
}

/// Yields the scripted bytes, then fails every further read.
struct BrokenStream {
    pending: Vec<u8>,
}

impl AsyncRead for BrokenStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pending.is_empty() {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "scripted progress stream failure",
            )));
        }
        let n = buf.remaining().min(self.pending.len());
        let chunk: Vec<u8> = self.pending.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

struct ScriptedProcess {
    progress: Option<ProgressStream>,
    writer: Option<DuplexStream>,
    exit_code: Option<i32>,
    log: Arc<LaunchLog>,
}

#[async_trait::async_trait]
impl EncoderProcess for ScriptedProcess {
    fn take_progress(&mut self) -> Option<ProgressStream> {
        self.progress.take()
    }

    async fn wait(&mut self) -> std::io::Result<EncoderExit> {
        if self.writer.is_some() {
            std::future::pending::<()>().await;
        }
        match self.exit_code {
            Some(code) => Ok(EncoderExit {
                code: Some(code),
                diagnostics: if code == 0 {
                    String::new()
                } else {
                    "scripted failure".to_string()
                },
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scripted exit status unavailable",
            )),
        }
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        self.writer = None;
        self.log.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers every probe with the same document, or with a failure.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    document: Option<ProbeDocument>,
}

impl StaticProbe {
    pub fn new(document: ProbeDocument) -> Self {
        Self {
            document: Some(document),
        }
    }

    /// A 1080p H.264 + stereo AAC video of the given length.
    pub fn with_duration(seconds: f64) -> Self {
        Self::new(ProbeDocument {
            streams: vec![
                ProbeStream {
                    codec_type: Some("video".into()),
                    codec_name: Some("h264".into()),
                    width: Some(1920),
                    height: Some(1080),
                    r_frame_rate: Some("25/1".into()),
                    bit_rate: Some("4000000".into()),
                    ..ProbeStream::default()
                },
                ProbeStream {
                    codec_type: Some("audio".into()),
                    codec_name: Some("aac".into()),
                    bit_rate: Some("128000".into()),
                    channels: Some(2),
                    ..ProbeStream::default()
                },
            ],
            format: ProbeFormat {
                duration: Some(seconds.to_string()),
            },
        })
    }

    pub fn failing() -> Self {
        Self { document: None }
    }
}

#[async_trait::async_trait]
impl MetadataProbe for StaticProbe {
    async fn probe(&self, _video: &Path) -> ProbeResult<ProbeDocument> {
        self.document
            .clone()
            .ok_or(ProbeError::MissingVideoStream)
    }
}

/// Replays canned answers and records what was asked. Runs out as `No`.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<PromptAnswer>>,
    asked: Mutex<Vec<PathBuf>>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<PromptAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<PathBuf> {
        self.asked
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DeletePrompt for ScriptedPrompt {
    async fn confirm_delete(&self, path: &Path) -> PromptAnswer {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(path.to_path_buf());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(PromptAnswer::No)
    }
}
