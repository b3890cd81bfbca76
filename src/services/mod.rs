pub mod alignment_pipeline;
pub mod archive_manager;
pub mod chain_supervisor;
pub mod convergence_loop;
pub mod convergence_policy;
pub mod input_discovery;
pub mod interrupt;
pub mod statistics_probe;
pub mod trace_reader;

pub use alignment_pipeline::{AlignmentPipeline, AlignmentResult, PipelineReport};
pub use archive_manager::{ArchiveManager, ArchiveReport};
pub use chain_supervisor::ChainSupervisor;
pub use convergence_loop::{ConvergenceLoop, LoopOutcome};
pub use convergence_policy::{discard, ConvergencePolicy, Evaluation, Precheck};
pub use statistics_probe::ExternalStatisticsProbe;
