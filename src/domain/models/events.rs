//! Pipeline progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::convergence::{ConvergenceSnapshot, Outcome, RunLogRow, Verdict};

/// Events emitted while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PipelineEvent {
    AlignmentStarted {
        alignment: String,
        index: usize,
        total: usize,
    },
    ChainsLaunched {
        alignment: String,
        chains: Vec<String>,
        threads_per_chain: usize,
    },
    CycleCompleted {
        alignment: String,
        cycle: u64,
        snapshot: ConvergenceSnapshot,
        verdict: Verdict,
    },
    AlignmentFinished {
        alignment: String,
        outcome: Outcome,
        row: Option<RunLogRow>,
    },
    AlignmentFailed {
        alignment: String,
        error: String,
    },
    PipelineFinished {
        processed: usize,
        finished_at: DateTime<Utc>,
    },
}
