//! Phylomatic - MCMC chain convergence orchestrator
//!
//! For each alignment, phylomatic launches a set of independent phylogenetic
//! MCMC samplers, periodically compares their traces and tree samples with
//! external tools, stops them once they agree or pass a generation limit, and
//! archives their outputs with a run-log row.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): Configuration, convergence models, errors and ports
//! - **Service Layer** (`services`): Supervision, monitoring, policy and archival
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use phylomatic::services::{input_discovery, AlignmentPipeline, ExternalStatisticsProbe};
//! use phylomatic::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let alignments =
//!         input_discovery::discover(&["data".into()], &config.input.filetypes).await?;
//!     let probe = Arc::new(ExternalStatisticsProbe::new(
//!         config.tools.clone(),
//!         config.output.clone(),
//!     ));
//!     let report = AlignmentPipeline::new(config, probe).run(&alignments).await?;
//!     println!("{} alignments processed", report.results.len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{PipelineError, PipelineResult, ProbeError};
pub use domain::models::{Alignment, Config, Outcome, PipelineEvent, RunLogRow, Statistics, Verdict};
pub use domain::ports::StatisticsProbe;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AlignmentPipeline, ConvergencePolicy, PipelineReport};
