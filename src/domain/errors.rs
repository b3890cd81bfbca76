//! Domain errors for the Phylomatic pipeline.
//!
//! Only probe, launch, archival and discovery failures are represented here.
//! A missing trace file and a signal sent to an already-dead process are
//! absorbed where they happen and never become errors.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while running or parsing the comparison tools.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited unsuccessfully ({status})")]
    ToolFailed { tool: String, status: String },

    #[error("Stale result file {path} could not be removed: {source}")]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Result file {path} could not be read: {source}")]
    MissingOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Result file {path} has no line {line}")]
    MissingLine { path: PathBuf, line: usize },

    #[error("Line {line} of {path} has {found} fields, expected at least {expected}")]
    FieldCount {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Field {field} on line {line} of {path} is not a valid number: {value:?}")]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        field: usize,
        value: String,
    },
}

/// Errors that abort an alignment and, with it, the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Statistics probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Failed to launch sampler for chain {chain}: {source}")]
    Launch {
        chain: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archival failed at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },

    #[error("No alignments found in the given inputs")]
    NoAlignments,

    #[error("Interrupted by SIGINT")]
    Interrupted,

    #[error("Cannot listen for interrupts: {0}")]
    SignalHandler(#[source] std::io::Error),

    #[error("Alignment {alignment} aborted: {source}")]
    Aborted {
        alignment: String,
        #[source]
        source: Box<PipelineError>,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Wrap an archival IO failure with the path being touched.
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }
}
