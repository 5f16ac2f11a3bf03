use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub type BatchResult<T> = Result<T, BatchError>;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to list {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("no .{extension} files found in {path}")]
    EmptyInput { path: PathBuf, extension: String },
}

/// A video and the subtitle picked for it. `subtitle` is `None` when nothing
/// matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub video: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub directory: PathBuf,
    entries: Vec<MatchedPair>,
}

impl BatchPlan {
    /// Videos that found a subtitle, as `(video, subtitle)` file names.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().filter_map(|entry| {
            entry
                .subtitle
                .as_deref()
                .map(|subtitle| (entry.video.as_str(), subtitle))
        })
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.subtitle.is_none())
            .map(|entry| entry.video.as_str())
    }

    pub fn entries(&self) -> &[MatchedPair] {
        &self.entries
    }
}

/// Pairs videos with subtitles inside one directory.
///
/// Both file lists are sorted by name first, so when several subtitles
/// contain a video's stem the lexicographically first one wins on every
/// platform.
#[derive(Debug, Clone)]
pub struct BatchMatcher {
    video_extension: String,
    subtitle_extension: String,
}

impl BatchMatcher {
    pub fn new(video_extension: impl Into<String>, subtitle_extension: impl Into<String>) -> Self {
        Self {
            video_extension: video_extension.into(),
            subtitle_extension: subtitle_extension.into(),
        }
    }

    pub fn match_directory(&self, directory: &Path) -> BatchResult<BatchPlan> {
        let listing = fs::read_dir(directory).map_err(|source| BatchError::Io {
            source,
            path: directory.to_path_buf(),
        })?;
        let mut videos = Vec::new();
        let mut subtitles = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|source| BatchError::Io {
                source,
                path: directory.to_path_buf(),
            })?;
            if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if has_extension(&name, &self.video_extension) {
                videos.push(name);
            } else if has_extension(&name, &self.subtitle_extension) {
                subtitles.push(name);
            }
        }

        for (files, extension) in [
            (&videos, &self.video_extension),
            (&subtitles, &self.subtitle_extension),
        ] {
            if files.is_empty() {
                return Err(BatchError::EmptyInput {
                    path: directory.to_path_buf(),
                    extension: extension.clone(),
                });
            }
        }

        videos.sort();
        subtitles.sort();
        debug!(
            directory = %directory.display(),
            videos = videos.len(),
            subtitles = subtitles.len(),
            "batch directory listed"
        );
        let entries = pair_files(&videos, &subtitles);
        for video in entries.iter().filter(|entry| entry.subtitle.is_none()) {
            warn!(video = %video.video, "no matching subtitle file");
        }
        Ok(BatchPlan {
            directory: directory.to_path_buf(),
            entries,
        })
    }
}

/// For each video, in the given order, picks the first subtitle whose name
/// contains the video's stem (case-sensitive).
pub fn pair_files(videos: &[String], subtitles: &[String]) -> Vec<MatchedPair> {
    videos
        .iter()
        .map(|video| {
            let stem = file_stem(video);
            let subtitle = subtitles
                .iter()
                .find(|subtitle| subtitle.contains(stem))
                .cloned();
            MatchedPair {
                video: video.clone(),
                subtitle,
            }
        })
        .collect()
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn pairs_by_stem_substring() {
        let pairs = pair_files(
            &names(&["ep1.mp4", "ep2.mp4"]),
            &names(&["ep1.en.srt", "ep2.en.srt"]),
        );
        assert_eq!(
            pairs,
            vec![
                MatchedPair {
                    video: "ep1.mp4".into(),
                    subtitle: Some("ep1.en.srt".into())
                },
                MatchedPair {
                    video: "ep2.mp4".into(),
                    subtitle: Some("ep2.en.srt".into())
                },
            ]
        );
    }

    #[test]
    fn first_candidate_wins_and_case_matters() {
        let pairs = pair_files(
            &names(&["Show.mp4"]),
            &names(&["show.srt", "Show.de.srt", "Show.en.srt"]),
        );
        assert_eq!(pairs[0].subtitle.as_deref(), Some("Show.de.srt"));
    }

    #[test]
    fn stem_strips_only_last_extension() {
        assert_eq!(file_stem("a.b.mp4"), "a.b");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("plain"), "plain");
    }

    #[test]
    fn directory_listing_is_sorted_and_reports_unmatched() {
        let dir = tempdir().unwrap();
        for name in ["ep3.mp4", "ep2.mp4", "ep1.mp4", "ep2.en.srt", "ep1.en.srt", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("output.mp4")).unwrap();
        let plan = BatchMatcher::new("mp4", "srt")
            .match_directory(dir.path())
            .unwrap();
        let pairs: Vec<_> = plan.pairs().collect();
        assert_eq!(pairs, vec![("ep1.mp4", "ep1.en.srt"), ("ep2.mp4", "ep2.en.srt")]);
        assert_eq!(plan.unmatched().collect::<Vec<_>>(), vec!["ep3.mp4"]);
        assert_eq!(plan.entries().len(), 3);
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(has_extension("EP1.MP4", "mp4"));
        assert!(!has_extension("ep1.mp4.part", "mp4"));
    }

    #[test]
    fn missing_subtitles_is_empty_input() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ep1.mp4"), b"x").unwrap();
        let err = BatchMatcher::new("mp4", "srt")
            .match_directory(dir.path())
            .unwrap_err();
        match err {
            BatchError::EmptyInput { extension, .. } => assert_eq!(extension, "srt"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_directory_is_io() {
        let dir = tempdir().unwrap();
        let err = BatchMatcher::new("mp4", "srt")
            .match_directory(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, BatchError::Io { .. }));
    }
}
