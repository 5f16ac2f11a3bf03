pub mod console;
pub mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::SecondsFormat;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use subburn_core::config::{load_config, SubburnConfig};
use subburn_core::guard::OverwritePolicy;
use subburn_core::orchestrator::{
    BatchOptions, BatchReport, JobError, JobOutcome, JobReport, JobSpec, Orchestrator,
};
use subburn_core::progress::format_clock;
use subburn_core::report::Verbosity;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleReporter;
use crate::prompt::TerminalPrompt;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] subburn_core::ConfigError),
    #[error("{0}")]
    Job(#[from] JobError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{failed} of {total} pairs failed")]
    BatchFailures { failed: usize, total: usize },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Burn SRT subtitles into MP4 videos with ffmpeg", long_about = None)]
pub struct Cli {
    /// Video file to process
    #[arg(required_unless_present = "tv", conflicts_with = "tv")]
    pub video: Option<PathBuf>,
    /// Subtitle file to burn in
    #[arg(required_unless_present = "tv", conflicts_with = "tv")]
    pub subtitle: Option<PathBuf>,
    /// Output subfolder, created next to the video
    #[arg(long)]
    pub output_folder: Option<String>,
    /// Output file name (single-file mode only)
    #[arg(long, conflicts_with = "tv")]
    pub output: Option<String>,
    /// Delete existing output files without asking
    #[arg(long)]
    pub overwrite: bool,
    /// Subtitle encoding label, skips detection
    #[arg(long)]
    pub encoding: Option<String>,
    #[arg(short, long)]
    pub verbose: bool,
    #[arg(short, long)]
    pub silent: bool,
    /// Process every matching video/subtitle pair in this directory
    #[arg(long, value_name = "DIR")]
    pub tv: Option<PathBuf>,
    /// Optional subburn.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Format of the final report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.silent)
    }

    fn overwrite_policy(&self) -> OverwritePolicy {
        if self.overwrite {
            OverwritePolicy::AutoDelete
        } else {
            OverwritePolicy::Prompt
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the level picked
/// from the verbosity flags.
pub fn init_logging(verbosity: Verbosity) {
    let fallback = match verbosity {
        Verbosity::Silent => "off",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SubburnConfig::default(),
    };
    let subfolder = cli
        .output_folder
        .clone()
        .unwrap_or_else(|| config.output.subfolder.clone());
    let verbosity = cli.verbosity();
    let orchestrator = Orchestrator::builder()
        .config(config)
        .prompt(Arc::new(TerminalPrompt))
        .reporter(Arc::new(ConsoleReporter::new(verbosity, cli.format)))
        .build();

    let cancel = CancellationToken::new();
    let listener = spawn_interrupt_listener(cancel.clone());
    let result = dispatch(&cli, &orchestrator, subfolder, &cancel).await;
    listener.abort();
    result
}

async fn dispatch(
    cli: &Cli,
    orchestrator: &Orchestrator,
    subfolder: String,
    cancel: &CancellationToken,
) -> Result<()> {
    let quiet = cli.verbosity() == Verbosity::Silent;
    if let Some(directory) = &cli.tv {
        let options = BatchOptions {
            output_subfolder: subfolder,
            overwrite: cli.overwrite_policy(),
            encoding: cli.encoding.clone(),
        };
        let report = orchestrator.run_batch(directory, &options, cancel).await?;
        if !quiet {
            render(&report, cli.format)?;
        }
        return batch_status(&report);
    }

    let (Some(video), Some(subtitle)) = (&cli.video, &cli.subtitle) else {
        return Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "a video and a subtitle file are required",
        )));
    };
    let job = JobSpec::beside_video(video, subtitle, subfolder)
        .with_output_name(cli.output.clone())
        .with_overwrite(cli.overwrite_policy())
        .with_encoding(cli.encoding.clone());
    let outcome = orchestrator.run_job(&job, cancel).await?;
    if !quiet {
        render(&outcome, cli.format)?;
    }
    Ok(())
}

fn batch_status(report: &BatchReport) -> Result<()> {
    if report.interrupted {
        return Err(AppError::Job(JobError::Interrupted));
    }
    if !report.failed.is_empty() {
        return Err(AppError::BatchFailures {
            failed: report.failed.len(),
            total: report.completed.len() + report.skipped.len() + report.failed.len(),
        });
    }
    Ok(())
}

fn spawn_interrupt_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("interrupt received, cancelling");
                cancel.cancel();
            }
            Err(error) => warn!(%error, "unable to listen for interrupts"),
        }
    })
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for JobReport {
    fn display(&self) -> String {
        [
            format!("Output: {}", self.output.display()),
            format!(
                "  Source: {} ({})",
                self.video.display(),
                format_clock(self.metadata.duration)
            ),
            format!(
                "  Subtitle: {} ({}, {} entries)",
                self.subtitle.path.display(),
                self.subtitle.encoding,
                self.subtitle.entry_count
            ),
            format!("  Took: {}", format_clock(self.elapsed_seconds)),
            format!(
                "  Finished at: {}",
                self.completed_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        ]
        .join("\n")
    }
}

impl DisplayFallback for JobOutcome {
    fn display(&self) -> String {
        match self {
            JobOutcome::Completed(report) => report.display(),
            JobOutcome::Skipped { output } => {
                format!("Skipped: {} already exists", output.display())
            }
        }
    }
}

impl DisplayFallback for BatchReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Batch {}: {} completed, {} skipped, {} failed, {} unmatched",
            self.directory.display(),
            self.completed.len(),
            self.skipped.len(),
            self.failed.len(),
            self.unmatched.len()
        )];
        for report in &self.completed {
            lines.push(format!("  - done: {}", report.output.display()));
        }
        for output in &self.skipped {
            lines.push(format!("  - skipped: {}", output.display()));
        }
        for pair in &self.failed {
            lines.push(format!("  - failed: {} ({})", pair.video, pair.error));
        }
        for video in &self.unmatched {
            lines.push(format!("  - no subtitle: {video}"));
        }
        if self.interrupted {
            lines.push("Interrupted before all pairs were processed".to_string());
        }
        lines.join("\n")
    }
}
