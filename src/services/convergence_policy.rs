//! Convergence decision policy.
//!
//! Turns per-chain generation counts and the comparison statistics into a
//! [`Verdict`]. The decision itself is pure; [`ConvergencePolicy::evaluate`]
//! only adds the probe call between the progress check and the decision.
//!
//! All generation-based checks use one representative value: the slowest
//! chain's count. "Every chain past the ceiling" and "some chain below the
//! minimum" are then both single comparisons, and the burn-in is sized from
//! data every chain actually has.

use tracing::debug;

use crate::domain::errors::ProbeError;
use crate::domain::models::{Config, Statistics, Verdict};
use crate::domain::ports::StatisticsProbe;

/// Burn-in to discard: a tenth of the progress, capped at `max_discard`.
pub const fn discard(generation: u64, max_discard: u64) -> u64 {
    let proportional = generation / 10;
    if proportional < max_discard {
        proportional
    } else {
        max_discard
    }
}

/// Outcome of the progress check that precedes any statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    /// Too early; the probe must not run
    BelowMinimumCycles,
    /// Statistics are needed to decide
    Evaluate {
        representative: u64,
        above_max_gen: bool,
        discard: u64,
    },
}

/// Result of a full policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// Present whenever the probe ran
    pub statistics: Option<Statistics>,
}

/// Thresholds the verdict is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePolicy {
    pub min_cycles: u64,
    pub max_gen: u64,
    pub max_effsize: u64,
    pub min_rel_diff: f64,
    pub min_maxdiff: f64,
    pub max_discard: u64,
}

impl ConvergencePolicy {
    pub const fn from_config(config: &Config) -> Self {
        Self {
            min_cycles: config.generations.min_cycles,
            max_gen: config.thresholds.max_gen,
            max_effsize: config.thresholds.max_loglik_effsize,
            min_rel_diff: config.thresholds.min_loglik_rel_diff,
            min_maxdiff: config.thresholds.min_maxdiff,
            max_discard: config.generations.max_discard,
        }
    }

    /// The slowest chain's generation count; zero when there are no chains.
    pub fn representative(generations: &[u64]) -> u64 {
        generations.iter().copied().min().unwrap_or(0)
    }

    /// Progress-only part of the decision.
    pub fn precheck(&self, generations: &[u64]) -> Precheck {
        let representative = Self::representative(generations);
        if representative <= self.min_cycles {
            return Precheck::BelowMinimumCycles;
        }

        Precheck::Evaluate {
            representative,
            above_max_gen: representative > self.max_gen,
            discard: discard(representative, self.max_discard),
        }
    }

    /// All three statistics must agree before a run counts as converged.
    pub fn is_converged(&self, statistics: &Statistics) -> bool {
        statistics.effsize > self.max_effsize
            && statistics.loglik_rel_diff < self.min_rel_diff
            && statistics.max_diff < self.min_maxdiff
    }

    /// Verdict once statistics are known. Convergence wins over the ceiling.
    pub fn decide(&self, above_max_gen: bool, statistics: &Statistics) -> Verdict {
        if self.is_converged(statistics) {
            Verdict::Stop { converged: true }
        } else if above_max_gen {
            Verdict::Stop { converged: false }
        } else {
            Verdict::Continue
        }
    }

    /// Full evaluation, running the probe only when the precheck allows it.
    pub async fn evaluate(
        &self,
        chains: &[String],
        generations: &[u64],
        tree_sample_interval: u64,
        probe: &dyn StatisticsProbe,
    ) -> Result<Evaluation, ProbeError> {
        match self.precheck(generations) {
            Precheck::BelowMinimumCycles => Ok(Evaluation {
                verdict: Verdict::BelowMinimumCycles,
                statistics: None,
            }),
            Precheck::Evaluate {
                representative,
                above_max_gen,
                discard,
            } => {
                debug!(representative, above_max_gen, discard, "probing convergence statistics");
                let statistics = probe.run(chains, discard, tree_sample_interval).await?;
                Ok(Evaluation {
                    verdict: self.decide(above_max_gen, &statistics),
                    statistics: Some(statistics),
                })
            }
        }
    }
}
