pub mod alignment;
pub mod config;
pub mod convergence;
pub mod events;

pub use alignment::{Alignment, Chain};
pub use config::{
    Config, GenerationsConfig, InputConfig, LoggingConfig, OutputConfig, PollingConfig,
    SamplerConfig, ThresholdsConfig, ToolsConfig,
};
pub use convergence::{
    ChainProgress, ConvergenceSnapshot, Outcome, RunLogRow, Statistics, Verdict,
};
pub use events::PipelineEvent;
