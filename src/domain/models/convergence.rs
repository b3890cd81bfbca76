//! Convergence domain models.
//!
//! Per-cycle snapshots, the verdict produced from them, archival outcomes and
//! the run-log row written once an alignment completes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics reported by the two comparison tools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Log-likelihood effective sample size
    pub effsize: u64,
    /// Log-likelihood relative difference between chains
    pub loglik_rel_diff: f64,
    /// Maximum pairwise bipartition difference
    pub max_diff: f64,
}

/// Generation count observed for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProgress {
    pub label: String,
    pub generation: u64,
}

/// What one poll cycle observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSnapshot {
    /// Progress per chain, in label order
    pub generations: Vec<ChainProgress>,
    /// Present only when the comparison tools ran this cycle
    pub statistics: Option<Statistics>,
}

impl ConvergenceSnapshot {
    /// Generation counts in label order.
    pub fn generation_values(&self) -> Vec<u64> {
        self.generations.iter().map(|p| p.generation).collect()
    }
}

/// Decision taken at the end of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// Not enough generations to judge yet
    BelowMinimumCycles,
    /// Thresholds not met, keep sampling
    Continue,
    /// Terminal; `converged` is false when the generation ceiling forced the stop
    Stop { converged: bool },
}

impl Verdict {
    /// Whether the loop must stop after this verdict.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }

    /// Archival outcome for a terminal verdict.
    pub const fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Stop { converged: true } => Some(Outcome::Converged),
            Self::Stop { converged: false } => Some(Outcome::NotConverged),
            Self::BelowMinimumCycles | Self::Continue => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMinimumCycles => f.write_str("below minimum cycles"),
            Self::Continue => f.write_str("continue"),
            Self::Stop { converged: true } => f.write_str("stop (converged)"),
            Self::Stop { converged: false } => f.write_str("stop (generation limit)"),
        }
    }
}

/// Where an alignment's artifacts end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Converged,
    NotConverged,
    TerminatedByError,
}

impl Outcome {
    /// Directory name under the archive's tree root.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::NotConverged => "not_converged",
            Self::TerminatedByError => "terminated",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogRow {
    pub alignment: String,
    pub converged: bool,
    pub statistics: Statistics,
    /// Final generation count per chain, in label order
    pub generations: Vec<u64>,
}

impl RunLogRow {
    /// Header line naming each chain column.
    pub fn header(chain_labels: &[String]) -> String {
        let mut columns = vec![
            "alignment".to_string(),
            "converged".to_string(),
            "loglik_effsize".to_string(),
            "loglik_rel_diff".to_string(),
            "max_diff".to_string(),
        ];
        columns.extend(chain_labels.iter().cloned());
        columns.join(", ")
    }

    /// Row rendered with the same delimiter as the header.
    pub fn to_line(&self) -> String {
        let mut fields = vec![
            self.alignment.clone(),
            self.converged.to_string(),
            self.statistics.effsize.to_string(),
            self.statistics.loglik_rel_diff.to_string(),
            self.statistics.max_diff.to_string(),
        ];
        fields.extend(self.generations.iter().map(ToString::to_string));
        fields.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_outcome() {
        assert_eq!(Verdict::BelowMinimumCycles.outcome(), None);
        assert_eq!(Verdict::Continue.outcome(), None);
        assert_eq!(
            Verdict::Stop { converged: true }.outcome(),
            Some(Outcome::Converged)
        );
        assert_eq!(
            Verdict::Stop { converged: false }.outcome(),
            Some(Outcome::NotConverged)
        );
        assert!(Verdict::Stop { converged: false }.is_terminal());
        assert!(!Verdict::Continue.is_terminal());
    }

    #[test]
    fn test_run_log_header_and_row() {
        let labels = vec!["chain_1".to_string(), "chain_2".to_string()];
        assert_eq!(
            RunLogRow::header(&labels),
            "alignment, converged, loglik_effsize, loglik_rel_diff, max_diff, chain_1, chain_2"
        );

        let row = RunLogRow {
            alignment: "primates".to_string(),
            converged: true,
            statistics: Statistics {
                effsize: 350,
                loglik_rel_diff: 0.05,
                max_diff: 0.02,
            },
            generations: vec![1500, 1600],
        };
        assert_eq!(row.to_line(), "primates, true, 350, 0.05, 0.02, 1500, 1600");
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let json = serde_json::to_value(Verdict::Stop { converged: true }).unwrap();
        assert_eq!(json["verdict"], "stop");
        assert_eq!(json["converged"], true);
    }
}
