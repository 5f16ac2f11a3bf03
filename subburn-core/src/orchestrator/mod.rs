mod error;
mod types;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::BatchMatcher;
use crate::config::SubburnConfig;
use crate::encoding::EncodingNormalizer;
use crate::guard::{DeclinePrompt, Decision, DeletePrompt, OutputGuard, OverwritePolicy};
use crate::probe::{FfprobeProbe, MediaMetadata, MetadataProbe};
use crate::report::{JobEvent, NullReporter, Reporter, SubtitleFile};
use crate::supervisor::{EncoderInvocation, EncoderLauncher, ProcessSupervisor};

pub use error::{JobError, JobResult};
pub use types::{BatchOptions, BatchReport, FailedPair, JobOutcome, JobReport, JobSpec};

/// Runs single jobs and batches end to end: subtitle normalization, output
/// preparation, probing, supervised encoding and cleanup.
pub struct Orchestrator {
    config: Arc<SubburnConfig>,
    normalizer: EncodingNormalizer,
    matcher: BatchMatcher,
    probe: Arc<dyn MetadataProbe>,
    supervisor: ProcessSupervisor,
    guard: OutputGuard,
    reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("normalizer", &self.normalizer)
            .field("matcher", &self.matcher)
            .finish()
    }
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    config: SubburnConfig,
    probe: Option<Arc<dyn MetadataProbe>>,
    launcher: Option<Arc<dyn EncoderLauncher>>,
    prompt: Option<Arc<dyn DeletePrompt>>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SubburnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn MetadataProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn EncoderLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn DeletePrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Orchestrator {
        let config = self.config;
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(FfprobeProbe::new(config.encoder.ffprobe.clone(), None)));
        let prompt = self.prompt.unwrap_or_else(|| Arc::new(DeclinePrompt));
        Orchestrator {
            normalizer: EncodingNormalizer::from_files_section(&config.files),
            matcher: BatchMatcher::new(
                config.files.video_extension.clone(),
                config.files.subtitle_extension.clone(),
            ),
            probe,
            supervisor: ProcessSupervisor::new(self.launcher),
            guard: OutputGuard::new(prompt),
            reporter: self.reporter.unwrap_or_else(|| Arc::new(NullReporter)),
            config: Arc::new(config),
        }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub async fn run_job(&self, job: &JobSpec, cancel: &CancellationToken) -> JobResult<JobOutcome> {
        let started = Instant::now();
        let utf8_subtitle = self
            .normalizer
            .normalize(&job.subtitle, job.encoding.as_deref())?;
        self.validate_video(&job.video)?;
        let output = self.prepare_output(job).await?;

        let existed = output.exists();
        match self.guard.resolve_pre_existing(&output, job.overwrite).await? {
            Decision::Proceed => {
                if existed {
                    self.reporter
                        .report(JobEvent::ExistingOutputDeleted { path: output.clone() });
                }
            }
            Decision::Abort => {
                self.reporter
                    .report(JobEvent::ExistingOutputKept { path: output.clone() });
                return Ok(JobOutcome::Skipped { output });
            }
            Decision::ForcedDelete => {
                self.reporter
                    .report(JobEvent::ExistingOutputDeleted { path: output.clone() });
                self.reporter.report(JobEvent::Interrupted);
                return Err(JobError::Interrupted);
            }
        }

        match self
            .encode(job, &utf8_subtitle, &output, cancel, started)
            .await
        {
            Ok(report) => Ok(JobOutcome::Completed(report)),
            Err(err) => {
                if err.is_interrupted() {
                    self.reporter.report(JobEvent::Interrupted);
                }
                self.cleanup(&output, job.overwrite).await;
                Err(err)
            }
        }
    }

    /// Processes every matched pair in `directory`. A failing pair is
    /// recorded and the batch moves on; an interruption ends the batch.
    pub async fn run_batch(
        &self,
        directory: &Path,
        options: &BatchOptions,
        cancel: &CancellationToken,
    ) -> JobResult<BatchReport> {
        let plan = self.matcher.match_directory(directory)?;
        let mut report = BatchReport {
            directory: directory.to_path_buf(),
            ..BatchReport::default()
        };
        for video in plan.unmatched() {
            self.reporter.report(JobEvent::Unmatched {
                video: video.to_string(),
            });
            report.unmatched.push(video.to_string());
        }

        for (video, subtitle) in plan.pairs() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let job = JobSpec {
                video: directory.join(video),
                subtitle: directory.join(subtitle),
                directory: directory.to_path_buf(),
                output_subfolder: options.output_subfolder.clone(),
                output_name: None,
                overwrite: options.overwrite,
                encoding: options.encoding.clone(),
            };
            self.reporter.report(JobEvent::PairStarted {
                video: job.video.clone(),
                subtitle: job.subtitle.clone(),
            });
            match self.run_job(&job, cancel).await {
                Ok(JobOutcome::Completed(done)) => report.completed.push(done),
                Ok(JobOutcome::Skipped { output }) => report.skipped.push(output),
                Err(JobError::Interrupted) => {
                    report.interrupted = true;
                    break;
                }
                Err(err) => {
                    error!(video, subtitle, error = %err, "batch pair failed");
                    self.reporter.report(JobEvent::JobFailed {
                        video: job.video.clone(),
                        message: err.to_string(),
                    });
                    report.failed.push(FailedPair {
                        video: video.to_string(),
                        subtitle: subtitle.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        info!(
            directory = %directory.display(),
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            unmatched = report.unmatched.len(),
            "batch finished"
        );
        Ok(report)
    }

    async fn encode(
        &self,
        job: &JobSpec,
        utf8_subtitle: &Path,
        output: &Path,
        cancel: &CancellationToken,
        started: Instant,
    ) -> JobResult<JobReport> {
        let document = self.probe.probe(&job.video).await?;
        let metadata = MediaMetadata::from_document(&document)?;
        let detected = self
            .normalizer
            .detect(&job.subtitle, job.encoding.as_deref())?;
        let subtitle = SubtitleFile {
            path: job.subtitle.clone(),
            encoding: detected.label().to_string(),
            utf8_path: utf8_subtitle.to_path_buf(),
            entry_count: self.normalizer.count_entries(utf8_subtitle)?,
        };
        self.reporter.report(JobEvent::FileInfo {
            video: job.video.clone(),
            metadata: metadata.clone(),
            subtitle: subtitle.clone(),
        });

        if cancel.is_cancelled() {
            return Err(JobError::Interrupted);
        }
        let invocation =
            EncoderInvocation::new(&self.config.encoder, &job.video, utf8_subtitle, output);
        let mut run = self.supervisor.start(&invocation).await?;
        let reporter = &self.reporter;
        run.drive(metadata.duration, cancel, |sample| {
            reporter.report(JobEvent::Progress(sample))
        })
        .await?;

        self.reporter.report(JobEvent::Completed {
            output: output.to_path_buf(),
        });
        Ok(JobReport {
            video: job.video.clone(),
            subtitle,
            output: output.to_path_buf(),
            metadata,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            completed_at: Utc::now(),
        })
    }

    fn validate_video(&self, video: &Path) -> JobResult<()> {
        let expected = &self.config.files.video_extension;
        let extension = video
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        if extension.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(JobError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    extension
                } else {
                    format!(".{extension}")
                },
                expected: expected.clone(),
            })
        }
    }

    async fn prepare_output(&self, job: &JobSpec) -> JobResult<PathBuf> {
        let folder = job.output_dir();
        let created = if folder.is_dir() {
            false
        } else {
            fs::create_dir_all(&folder)
                .await
                .map_err(|source| JobError::Io {
                    source,
                    path: folder.clone(),
                })?;
            true
        };
        self.reporter.report(JobEvent::OutputFolder {
            path: folder.clone(),
            created,
        });

        let explicit = job
            .output_name
            .as_deref()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_os_string());
        let name = match explicit {
            Some(name) => name,
            None => self.derived_output_name(&job.video).into(),
        };
        let output = folder.join(name);
        self.reporter
            .report(JobEvent::OutputPath { path: output.clone() });
        Ok(output)
    }

    fn derived_output_name(&self, video: &Path) -> String {
        let stem = video
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = video
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        format!("{stem}{}{extension}", self.config.files.output_suffix)
    }

    async fn cleanup(&self, output: &Path, policy: OverwritePolicy) {
        match self.guard.on_interrupt(output, policy).await {
            Ok(cleanup) => self.reporter.report(JobEvent::Cleanup {
                path: output.to_path_buf(),
                cleanup,
            }),
            Err(err) => warn!(path = %output.display(), error = %err, "cleanup failed"),
        }
    }
}
