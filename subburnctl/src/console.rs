use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use subburn_core::guard::Cleanup;
use subburn_core::progress::format_clock;
use subburn_core::report::{EventLevel, JobEvent, Reporter, Verbosity};
use tracing::warn;

use crate::OutputFormat;

/// Prints job events for the operator, filtered by verbosity.
///
/// Text mode rewrites progress in place on stdout. JSON mode writes one
/// object per event to stderr so stdout only carries the final report.
#[derive(Debug)]
pub struct ConsoleReporter {
    verbosity: Verbosity,
    format: OutputFormat,
    progress_open: AtomicBool,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            progress_open: AtomicBool::new(false),
        }
    }

    pub fn admits(&self, event: &JobEvent) -> bool {
        self.verbosity.admits(event.level())
    }

    fn print_text(&self, event: &JobEvent) {
        let mut stdout = std::io::stdout().lock();
        if let JobEvent::Progress(_) = event {
            self.progress_open.store(true, Ordering::Relaxed);
            let _ = write!(stdout, "\r{}", describe(event));
            let _ = stdout.flush();
            return;
        }
        if self.progress_open.swap(false, Ordering::Relaxed) {
            let _ = writeln!(stdout);
        }
        let _ = writeln!(stdout, "{}{}", marker(event.level()), describe(event));
    }

    fn print_json(&self, event: &JobEvent) {
        match serde_json::to_string(event) {
            Ok(line) => eprintln!("{line}"),
            Err(error) => warn!(%error, "failed to serialize job event"),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: JobEvent) {
        if !self.admits(&event) {
            return;
        }
        match self.format {
            OutputFormat::Text => self.print_text(&event),
            OutputFormat::Json => self.print_json(&event),
        }
    }
}

fn marker(level: EventLevel) -> &'static str {
    match level {
        EventLevel::Info => "",
        EventLevel::Warn => "warning: ",
        EventLevel::Error => "error: ",
        EventLevel::Success => "ok: ",
    }
}

/// One-line (or, for file information, multi-line) text for an event.
pub fn describe(event: &JobEvent) -> String {
    match event {
        JobEvent::PairStarted { video, subtitle } => format!(
            "Processing {} with {}",
            video.display(),
            subtitle.display()
        ),
        JobEvent::OutputFolder { path, created } => {
            if *created {
                format!("Created output folder {}", path.display())
            } else {
                format!("Using output folder {}", path.display())
            }
        }
        JobEvent::OutputPath { path } => format!("Output file: {}", path.display()),
        JobEvent::ExistingOutputDeleted { path } => {
            format!("Deleted existing output file {}", path.display())
        }
        JobEvent::ExistingOutputKept { path } => {
            format!("Kept existing output file {}, skipping", path.display())
        }
        JobEvent::FileInfo {
            video,
            metadata,
            subtitle,
        } => [
            format!("Video: {}", video.display()),
            format!("  Duration: {}", format_clock(metadata.duration)),
            format!("  Resolution: {}", metadata.resolution()),
            format!("  Frame rate: {:.2} fps", metadata.frame_rate),
            format!(
                "  Video codec: {} ({:.0} kb/s)",
                metadata.video_codec, metadata.video_bitrate_kbps
            ),
            format!(
                "  Audio codec: {} ({:.0} kb/s, {} channels)",
                metadata.audio_codec,
                metadata.audio_bitrate_kbps,
                metadata.audio_channels_label()
            ),
            format!("Subtitle: {}", subtitle.path.display()),
            format!("  Encoding: {}", subtitle.encoding),
            format!("  Entries: {}", subtitle.entry_count),
        ]
        .join("\n"),
        JobEvent::Progress(sample) => format!(
            "Progress {} | remaining {} | ETA {}",
            sample.position(),
            sample.media_remaining_clock(),
            sample.wall_remaining_clock()
        ),
        JobEvent::Completed { output } => format!("Finished {}", output.display()),
        JobEvent::Cleanup { path, cleanup } => match cleanup {
            Cleanup::NothingToClean => "No output file to clean up".to_string(),
            Cleanup::Deleted => format!("Deleted incomplete output {}", path.display()),
            Cleanup::ForcedDeleted => format!(
                "Deleted incomplete output {} after second interrupt",
                path.display()
            ),
            Cleanup::Kept => format!("Kept incomplete output {}", path.display()),
        },
        JobEvent::Unmatched { video } => format!("No subtitle file matches {video}"),
        JobEvent::JobFailed { video, message } => {
            format!("{} failed: {message}", video.display())
        }
        JobEvent::Interrupted => "Interrupted".to_string(),
    }
}
