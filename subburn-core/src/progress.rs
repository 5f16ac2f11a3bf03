use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

/// Position reported by the encoder, `time=HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaTimestamp {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl MediaTimestamp {
    pub fn as_seconds(&self) -> f64 {
        self.hours as f64 * 3600.0 + self.minutes as f64 * 60.0 + self.seconds as f64
    }
}

/// One progress observation. Estimates are recomputed from scratch for every
/// sample, so early values swing widely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSample {
    pub timestamp: MediaTimestamp,
    pub media_elapsed: f64,
    pub media_remaining: f64,
    pub wall_elapsed: Duration,
    pub wall_remaining: f64,
}

impl ProgressSample {
    pub fn position(&self) -> String {
        format_clock(self.media_elapsed)
    }

    pub fn media_remaining_clock(&self) -> String {
        format_clock(self.media_remaining)
    }

    pub fn wall_remaining_clock(&self) -> String {
        format_clock(self.wall_remaining)
    }
}

fn timestamp_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"time=(\d+):(\d+):(\d+)").expect("valid regex"))
}

pub fn parse_timestamp(line: &str) -> Option<MediaTimestamp> {
    let captures = timestamp_regex().captures(line)?;
    let field = |index: usize| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<u64>().ok())
    };
    Some(MediaTimestamp {
        hours: field(1)?,
        minutes: field(2)?,
        seconds: field(3)?,
    })
}

/// Turns one encoder progress line into remaining media time and remaining
/// wall-clock time, assuming constant throughput. Lines without a timestamp
/// yield `None`.
pub fn estimate(line: &str, total_duration: f64, wall_elapsed: Duration) -> Option<ProgressSample> {
    let timestamp = parse_timestamp(line)?;
    let media_elapsed = timestamp.as_seconds();
    let media_remaining = total_duration - media_elapsed;
    let wall_remaining = if media_elapsed > 0.0 {
        (wall_elapsed.as_secs_f64() / media_elapsed) * media_remaining
    } else {
        0.0
    };
    Some(ProgressSample {
        timestamp,
        media_elapsed,
        media_remaining,
        wall_elapsed,
        wall_remaining,
    })
}

/// Renders seconds as `HH:MM:SS`, truncating fractions. Negative values get a
/// leading `-`.
pub fn format_clock(seconds: f64) -> String {
    let whole = seconds.trunc() as i64;
    let sign = if whole < 0 { "-" } else { "" };
    let total = whole.unsigned_abs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{sign}{hours:02}:{minutes:02}:{secs:02}")
}
