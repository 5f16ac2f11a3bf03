pub mod batch;
pub mod command;
pub mod config;
pub mod encoding;
pub mod guard;
pub mod orchestrator;
pub mod probe;
pub mod progress;
pub mod report;
pub mod supervisor;
pub mod testing;

pub use batch::{BatchError, BatchMatcher, BatchPlan, BatchResult, MatchedPair};
pub use command::{CommandExecutor, SystemCommandExecutor};
pub use config::{
    load_config, ConfigError, ConfigResult, EncoderSection, FilesSection, OutputSection,
    SubburnConfig,
};
pub use encoding::{DetectedEncoding, EncodingNormalizer, NormalizeError, NormalizeResult};
pub use guard::{
    Cleanup, DeclinePrompt, Decision, DeletePrompt, GuardError, GuardResult, OutputGuard,
    OverwritePolicy, PromptAnswer,
};
pub use orchestrator::{
    BatchOptions, BatchReport, FailedPair, JobError, JobOutcome, JobReport, JobResult, JobSpec,
    Orchestrator, OrchestratorBuilder,
};
pub use probe::{FfprobeProbe, MediaMetadata, MetadataProbe, ProbeDocument, ProbeError};
pub use progress::{format_clock, MediaTimestamp, ProgressSample};
pub use report::{
    EventLevel, JobEvent, MemoryReporter, NullReporter, Reporter, SubtitleFile, Verbosity,
};
pub use supervisor::{
    EncoderInvocation, EncoderLauncher, ProcessSupervisor, RunState, SupervisedRun,
    SupervisorError, SystemEncoderLauncher,
};
