//! Convergence monitoring loop
//!
//! One loop runs per alignment. Each cycle reads the chains' progress, lets
//! the policy decide, and either waits for the next cycle or returns the
//! terminal verdict. The wait is the only suspension point: progress reads
//! and probe runs happen inline, so two probes can never overlap.
//!
//! An interrupt flag, when given, is checked before every cycle and ends the
//! wait early.
//!
//! Stopping the samplers and archiving are left to the caller.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{
    Alignment, Chain, ChainProgress, Config, ConvergenceSnapshot, Outcome, PipelineEvent,
    Statistics,
};
use crate::domain::ports::StatisticsProbe;
use crate::services::chain_supervisor::ChainSupervisor;
use crate::services::convergence_policy::ConvergencePolicy;
use crate::services::interrupt::{self, InterruptFlag};
use crate::services::trace_reader;

/// Terminal state of a monitoring loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub outcome: Outcome,
    /// Snapshot of the cycle that stopped the loop
    pub snapshot: ConvergenceSnapshot,
    pub statistics: Statistics,
    pub cycles: u64,
}

/// Polls one alignment's chains until the policy says stop.
pub struct ConvergenceLoop {
    policy: ConvergencePolicy,
    probe: Arc<dyn StatisticsProbe>,
    poll_interval: Duration,
    tree_sample_interval: u64,
    events: Option<mpsc::Sender<PipelineEvent>>,
    interrupt: Option<InterruptFlag>,
}

impl ConvergenceLoop {
    pub fn new(config: &Config, probe: Arc<dyn StatisticsProbe>) -> Self {
        Self {
            policy: ConvergencePolicy::from_config(config),
            probe,
            poll_interval: Duration::from_millis(config.polling.poll_interval_ms),
            tree_sample_interval: config.polling.tree_sample_freq,
            events: None,
            interrupt: None,
        }
    }

    /// Stop with [`PipelineError::Interrupted`] once the flag is set.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Send a [`PipelineEvent::CycleCompleted`] after every cycle.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Progress of every chain, in chain order.
    pub async fn read_progress(chains: &[Chain]) -> PipelineResult<Vec<ChainProgress>> {
        let mut generations = Vec::with_capacity(chains.len());
        for chain in chains {
            generations.push(ChainProgress {
                label: chain.label.clone(),
                generation: trace_reader::progress(&chain.trace_path).await?,
            });
        }
        Ok(generations)
    }

    /// Run cycles until a stop verdict.
    ///
    /// Any error, including an interrupt, ends the loop immediately and is
    /// returned to the caller.
    pub async fn run(
        &self,
        alignment: &Alignment,
        chains: &[Chain],
        supervisor: &mut ChainSupervisor,
    ) -> PipelineResult<LoopOutcome> {
        let labels: Vec<String> = chains.iter().map(|c| c.label.clone()).collect();
        let mut cycle: u64 = 0;
        let mut flag = self.interrupt.clone();

        loop {
            if flag.as_ref().is_some_and(interrupt::requested) {
                warn!(alignment = %alignment.id, cycle, "interrupted before convergence check");
                return Err(PipelineError::Interrupted);
            }
            cycle += 1;

            for (chain, status) in supervisor.poll_exits() {
                warn!(alignment = %alignment.id, %chain, ?status, "sampler exited on its own");
            }

            let generations = Self::read_progress(chains).await?;
            let values: Vec<u64> = generations.iter().map(|p| p.generation).collect();
            let evaluation = self
                .policy
                .evaluate(&labels, &values, self.tree_sample_interval, self.probe.as_ref())
                .await?;

            let snapshot = ConvergenceSnapshot {
                generations,
                statistics: evaluation.statistics,
            };

            info!(
                alignment = %alignment.id,
                cycle,
                generations = ?values,
                statistics = ?evaluation.statistics,
                verdict = %evaluation.verdict,
                "convergence check"
            );
            self.emit(PipelineEvent::CycleCompleted {
                alignment: alignment.id.clone(),
                cycle,
                snapshot: snapshot.clone(),
                verdict: evaluation.verdict,
            })
            .await;

            if let (Some(outcome), Some(statistics)) =
                (evaluation.verdict.outcome(), evaluation.statistics)
            {
                return Ok(LoopOutcome {
                    outcome,
                    snapshot,
                    statistics,
                    cycles: cycle,
                });
            }

            debug!(interval_ms = self.poll_interval.as_millis(), "waiting for next check");
            if let Some(flag) = flag.as_mut() {
                tokio::select! {
                    () = tokio::time::sleep(self.poll_interval) => {}
                    () = interrupt::wait(flag) => {
                        warn!(alignment = %alignment.id, cycle, "interrupted while waiting");
                        return Err(PipelineError::Interrupted);
                    }
                }
            } else {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
