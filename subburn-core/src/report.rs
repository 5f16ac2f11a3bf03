use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::guard::Cleanup;
use crate::probe::MediaMetadata;
use crate::progress::ProgressSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// How chatty the operator-facing output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Silent,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, silent: bool) -> Self {
        match (silent, verbose) {
            (true, _) => Verbosity::Silent,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }

    /// Silent shows nothing, normal shows errors and successes, verbose
    /// shows everything.
    pub fn admits(&self, level: EventLevel) -> bool {
        match self {
            Verbosity::Silent => false,
            Verbosity::Normal => matches!(level, EventLevel::Error | EventLevel::Success),
            Verbosity::Verbose => true,
        }
    }
}

/// Subtitle facts shown before an encode starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleFile {
    pub path: PathBuf,
    pub encoding: String,
    pub utf8_path: PathBuf,
    pub entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    PairStarted { video: PathBuf, subtitle: PathBuf },
    OutputFolder { path: PathBuf, created: bool },
    OutputPath { path: PathBuf },
    ExistingOutputDeleted { path: PathBuf },
    ExistingOutputKept { path: PathBuf },
    FileInfo {
        video: PathBuf,
        metadata: MediaMetadata,
        subtitle: SubtitleFile,
    },
    Progress(ProgressSample),
    Completed { output: PathBuf },
    Cleanup { path: PathBuf, cleanup: Cleanup },
    Unmatched { video: String },
    JobFailed { video: PathBuf, message: String },
    Interrupted,
}

impl JobEvent {
    pub fn level(&self) -> EventLevel {
        match self {
            JobEvent::PairStarted { .. }
            | JobEvent::OutputPath { .. }
            | JobEvent::FileInfo { .. } => EventLevel::Info,
            JobEvent::OutputFolder { created, .. } => {
                if *created {
                    EventLevel::Success
                } else {
                    EventLevel::Info
                }
            }
            JobEvent::ExistingOutputDeleted { .. }
            | JobEvent::Progress(_)
            | JobEvent::Completed { .. } => EventLevel::Success,
            JobEvent::ExistingOutputKept { .. } | JobEvent::Unmatched { .. } => EventLevel::Warn,
            JobEvent::Cleanup { cleanup, .. } => match cleanup {
                Cleanup::Kept => EventLevel::Warn,
                Cleanup::NothingToClean => EventLevel::Info,
                Cleanup::Deleted | Cleanup::ForcedDeleted => EventLevel::Success,
            },
            JobEvent::JobFailed { .. } | JobEvent::Interrupted => EventLevel::Error,
        }
    }
}

/// Sink for operator-facing job events.
pub trait Reporter: Send + Sync {
    fn report(&self, event: JobEvent);
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: JobEvent) {}
}

/// Keeps events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<JobEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: JobEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
