use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use subburn_core::config::{load_config, SubburnConfig};
use subburn_core::guard::{Cleanup, OverwritePolicy, PromptAnswer};
use subburn_core::orchestrator::{JobError, JobOutcome, JobSpec, Orchestrator};
use subburn_core::report::{JobEvent, MemoryReporter, Reporter};
use subburn_core::testing::{ScriptedLauncher, ScriptedPrompt, ScriptedRun, StaticProbe};

const SUBTITLE: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n";
const PROGRESS: &[&str] = &[
    "frame=10",
    "out_time=00:00:15.000000",
    "progress=continue",
    "out_time=00:00:45.000000",
    "progress=end",
];

fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(relative)
}

fn test_config(base: &TempDir) -> SubburnConfig {
    let mut config = load_config(fixture_path("configs/subburn.toml")).unwrap();
    let cache = base.path().join("cache");
    std::fs::create_dir_all(&cache).unwrap();
    config.files.cache_dir = cache;
    config
}

/// Forwards to a `MemoryReporter` and cancels the job on the first progress
/// sample, standing in for an operator pressing Ctrl-C mid-encode.
struct CancelOnProgress {
    token: CancellationToken,
    inner: MemoryReporter,
}

impl Reporter for CancelOnProgress {
    fn report(&self, event: JobEvent) {
        if matches!(event, JobEvent::Progress(_)) {
            self.token.cancel();
        }
        self.inner.report(event);
    }
}

struct Harness {
    base: TempDir,
    launcher: Arc<ScriptedLauncher>,
    prompt: Arc<ScriptedPrompt>,
    orchestrator: Orchestrator,
}

fn harness_with(
    runs: Vec<ScriptedRun>,
    answers: Vec<PromptAnswer>,
    reporter: Arc<dyn Reporter>,
) -> Harness {
    let base = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(runs));
    let prompt = Arc::new(ScriptedPrompt::new(answers));
    let orchestrator = Orchestrator::builder()
        .config(test_config(&base))
        .probe(Arc::new(StaticProbe::with_duration(60.0)))
        .launcher(launcher.clone())
        .prompt(prompt.clone())
        .reporter(reporter)
        .build();
    Harness {
        base,
        launcher,
        prompt,
        orchestrator,
    }
}

fn write_pair(dir: &Path, stem: &str, subtitle: &[u8]) -> (PathBuf, PathBuf) {
    let video = dir.join(format!("{stem}.mp4"));
    let srt = dir.join(format!("{stem}.srt"));
    std::fs::write(&video, b"video").unwrap();
    std::fs::write(&srt, subtitle).unwrap();
    (video, srt)
}

fn expected_output(dir: &Path, stem: &str) -> PathBuf {
    dir.join("output").join(format!("{stem}-with_subtitles.mp4"))
}

fn cleanup_events(events: &[JobEvent]) -> Vec<Cleanup> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::Cleanup { cleanup, .. } => Some(*cleanup),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn single_job_burns_subtitles_next_to_the_video() {
    let reporter = Arc::new(MemoryReporter::new());
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![],
        reporter.clone(),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let job = JobSpec::beside_video(&video, &srt, "output");

    let outcome = h
        .orchestrator
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();
    let report = match outcome {
        JobOutcome::Completed(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let output = expected_output(h.base.path(), "ep1");
    assert_eq!(report.output, output);
    assert_eq!(report.subtitle.entry_count, 2);
    assert_eq!(report.subtitle.encoding, "UTF-8");
    assert_eq!(report.metadata.duration, 60.0);
    assert!(output.parent().unwrap().is_dir());

    let invocations = h.launcher.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].subtitle, srt);
    assert_eq!(invocations[0].output, output);
    assert!(!h.base.path().join("cache").join("utf8_ep1.srt").exists());

    let events = reporter.events();
    let remaining: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            JobEvent::Progress(sample) => Some(sample.media_remaining),
            _ => None,
        })
        .collect();
    assert_eq!(remaining, vec![45.0, 15.0]);
    assert!(events.contains(&JobEvent::OutputFolder {
        path: h.base.path().join("output"),
        created: true,
    }));
    assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));
    assert!(cleanup_events(&events).is_empty());
}

#[tokio::test]
async fn explicit_output_name_keeps_only_the_file_name() {
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![],
        Arc::new(MemoryReporter::new()),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let job = JobSpec::beside_video(&video, &srt, "burned")
        .with_output_name(Some("../elsewhere/final.mp4".into()));

    h.orchestrator
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        h.launcher.invocations()[0].output,
        h.base.path().join("burned").join("final.mp4")
    );
}

#[tokio::test]
async fn legacy_subtitle_is_converted_once_and_reused() {
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![],
        Arc::new(MemoryReporter::new()),
    );
    let latin1 = b"1\n00:00:01,000 --> 00:00:02,000\nCaf\xe9 cr\xe8me\n";
    let (video, srt) = write_pair(h.base.path(), "ep1", latin1);
    let job = JobSpec::beside_video(&video, &srt, "output")
        .with_encoding(Some("latin1".into()))
        .with_overwrite(OverwritePolicy::AutoDelete);

    for _ in 0..2 {
        h.orchestrator
            .run_job(&job, &CancellationToken::new())
            .await
            .unwrap();
    }
    let cached = h.base.path().join("cache").join("utf8_ep1.srt");
    let text = std::fs::read_to_string(&cached).unwrap();
    assert!(text.contains("Café crème"));
    let invocations = h.launcher.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations.iter().all(|call| call.subtitle == cached));
}

#[tokio::test]
async fn unknown_encoding_label_is_rejected_before_launch() {
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![],
        Arc::new(MemoryReporter::new()),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let job = JobSpec::beside_video(&video, &srt, "output")
        .with_encoding(Some("klingon-8".into()));
    let err = h
        .orchestrator
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Encoding(_)));
    assert!(h.launcher.invocations().is_empty());
}

#[tokio::test]
async fn existing_output_is_replaced_without_asking_under_auto_delete() {
    let reporter = Arc::new(MemoryReporter::new());
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![PromptAnswer::No],
        reporter.clone(),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let output = expected_output(h.base.path(), "ep1");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"stale").unwrap();

    let job = JobSpec::beside_video(&video, &srt, "output")
        .with_overwrite(OverwritePolicy::AutoDelete);
    let outcome = h
        .orchestrator
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert!(h.prompt.asked().is_empty());
    assert!(!output.exists());
    assert!(reporter.events().contains(&JobEvent::OutputFolder {
        path: h.base.path().join("output"),
        created: false,
    }));
    assert!(reporter
        .events()
        .contains(&JobEvent::ExistingOutputDeleted { path: output }));
}

#[tokio::test]
async fn declined_overwrite_skips_the_job_and_keeps_the_file() {
    let reporter = Arc::new(MemoryReporter::new());
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![PromptAnswer::No],
        reporter.clone(),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let output = expected_output(h.base.path(), "ep1");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"keep me").unwrap();

    let job = JobSpec::beside_video(&video, &srt, "output");
    let outcome = h
        .orchestrator
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();
    match outcome {
        JobOutcome::Skipped { output: skipped } => assert_eq!(skipped, output),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
    assert_eq!(h.prompt.asked(), vec![output.clone()]);
    assert!(h.launcher.invocations().is_empty());
    assert!(reporter
        .events()
        .contains(&JobEvent::ExistingOutputKept { path: output }));
}

#[tokio::test]
async fn interrupt_while_asking_about_existing_output_deletes_it() {
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![PromptAnswer::Interrupted],
        Arc::new(MemoryReporter::new()),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let output = expected_output(h.base.path(), "ep1");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"stale").unwrap();

    let job = JobSpec::beside_video(&video, &srt, "output");
    let err = h
        .orchestrator
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
    assert!(!output.exists());
    assert!(h.launcher.invocations().is_empty());
}

#[tokio::test]
async fn wrong_container_is_rejected() {
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![],
        Arc::new(MemoryReporter::new()),
    );
    let video = h.base.path().join("ep1.mkv");
    let srt = h.base.path().join("ep1.srt");
    std::fs::write(&video, b"video").unwrap();
    std::fs::write(&srt, SUBTITLE).unwrap();

    let err = h
        .orchestrator
        .run_job(&JobSpec::beside_video(&video, &srt, "output"), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        JobError::UnsupportedFormat { extension, expected } => {
            assert_eq!(extension, ".mkv");
            assert_eq!(expected, "mp4");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.launcher.invocations().is_empty());
    assert!(!h.base.path().join("output").exists());
}

#[tokio::test]
async fn probe_failure_stops_before_the_encoder_starts() {
    let base = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(vec![ScriptedRun::succeeding(PROGRESS)]));
    let orchestrator = Orchestrator::builder()
        .config(test_config(&base))
        .probe(Arc::new(StaticProbe::failing()))
        .launcher(launcher.clone())
        .build();
    let (video, srt) = write_pair(base.path(), "ep1", SUBTITLE.as_bytes());

    let err = orchestrator
        .run_job(&JobSpec::beside_video(&video, &srt, "output"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Probe(_)));
    assert!(launcher.invocations().is_empty());
}

#[tokio::test]
async fn interruption_mid_encode_terminates_and_cleans_up_once() {
    let token = CancellationToken::new();
    let reporter = Arc::new(CancelOnProgress {
        token: token.clone(),
        inner: MemoryReporter::new(),
    });
    let h = harness_with(
        vec![ScriptedRun::hanging(PROGRESS).writing_output(b"partial")],
        vec![PromptAnswer::Yes],
        reporter.clone(),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let output = expected_output(h.base.path(), "ep1");

    let err = h
        .orchestrator
        .run_job(&JobSpec::beside_video(&video, &srt, "output"), &token)
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(h.launcher.terminations(), 1);
    assert!(!output.exists());
    assert_eq!(h.prompt.asked(), vec![output]);

    let events = reporter.inner.events();
    assert_eq!(cleanup_events(&events), vec![Cleanup::Deleted]);
    assert!(events.contains(&JobEvent::Interrupted));
    assert!(!events
        .iter()
        .any(|event| matches!(event, JobEvent::Completed { .. })));
}

#[tokio::test]
async fn failed_encode_asks_before_removing_partial_output() {
    let reporter = Arc::new(MemoryReporter::new());
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)
            .with_exit_code(Some(1))
            .writing_output(b"partial")],
        vec![PromptAnswer::No],
        reporter.clone(),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let output = expected_output(h.base.path(), "ep1");

    let err = h
        .orchestrator
        .run_job(&JobSpec::beside_video(&video, &srt, "output"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Encode { code: Some(1), .. }));
    assert!(output.exists());
    assert_eq!(h.prompt.asked(), vec![output]);
    assert_eq!(cleanup_events(&reporter.events()), vec![Cleanup::Kept]);
}

#[tokio::test]
async fn cancelled_token_prevents_launch() {
    let h = harness_with(
        vec![ScriptedRun::succeeding(PROGRESS)],
        vec![],
        Arc::new(MemoryReporter::new()),
    );
    let (video, srt) = write_pair(h.base.path(), "ep1", SUBTITLE.as_bytes());
    let token = CancellationToken::new();
    token.cancel();

    let err = h
        .orchestrator
        .run_job(&JobSpec::beside_video(&video, &srt, "output"), &token)
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
    assert!(h.launcher.invocations().is_empty());
}
