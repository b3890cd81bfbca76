//! Alignment pipeline
//!
//! Processes alignments strictly one after another: launch the chains,
//! monitor until a stop verdict, terminate the chains, archive. The next
//! alignment's chains start only after the previous archive completed.
//!
//! A failure while monitoring takes the abnormal path: the chains are
//! terminated, whatever artifacts exist are archived as terminated, and the
//! remaining alignments are abandoned.
//!
//! SIGINT is handled the same way. A single listener covers the whole run,
//! and the flag it sets is checked before each alignment starts and by the
//! convergence loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{Alignment, Config, Outcome, PipelineEvent, RunLogRow};
use crate::domain::ports::StatisticsProbe;
use crate::services::archive_manager::{ArchiveManager, ArchiveReport};
use crate::services::chain_supervisor::ChainSupervisor;
use crate::services::convergence_loop::ConvergenceLoop;
use crate::services::interrupt::{self, InterruptFlag};

/// Result of one completed alignment.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentResult {
    pub alignment: String,
    pub outcome: Outcome,
    pub row: RunLogRow,
    pub cycles: u64,
    pub archive: ArchiveReport,
}

/// Summary of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<AlignmentResult>,
}

/// Drives alignments through supervision, monitoring and archival.
pub struct AlignmentPipeline {
    config: Config,
    probe: Arc<dyn StatisticsProbe>,
    archive: ArchiveManager,
    events: Option<mpsc::Sender<PipelineEvent>>,
    interrupt: Option<InterruptFlag>,
}

impl AlignmentPipeline {
    pub fn new(config: Config, probe: Arc<dyn StatisticsProbe>) -> Self {
        let archive = ArchiveManager::new(config.output.clone(), config.polling.chains.clone());
        Self {
            config,
            probe,
            archive,
            events: None,
            interrupt: None,
        }
    }

    /// Use an existing interrupt flag instead of listening for SIGINT.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Report progress on the given channel.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Process every alignment in order.
    ///
    /// Stops at the first alignment that fails and returns
    /// [`PipelineError::Aborted`]; alignments after it are not started.
    pub async fn run(&self, alignments: &[Alignment]) -> PipelineResult<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("pipeline", %run_id);

        let (interrupt_flag, _listener) = match &self.interrupt {
            Some(flag) => (flag.clone(), None),
            None => {
                let (flag, listener) = interrupt::listen()?;
                (flag, Some(listener))
            }
        };

        async {
            info!(alignments = alignments.len(), "pipeline started");
            let mut results = Vec::with_capacity(alignments.len());

            for (index, alignment) in alignments.iter().enumerate() {
                let processed = if interrupt::requested(&interrupt_flag) {
                    Err(PipelineError::Interrupted)
                } else {
                    self.emit(PipelineEvent::AlignmentStarted {
                        alignment: alignment.id.clone(),
                        index,
                        total: alignments.len(),
                    })
                    .await;
                    self.process(alignment, &interrupt_flag).await
                };

                match processed {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        error!(alignment = %alignment.id, error = %e, "alignment failed, aborting pipeline");
                        self.emit(PipelineEvent::AlignmentFailed {
                            alignment: alignment.id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                        return Err(PipelineError::Aborted {
                            alignment: alignment.id.clone(),
                            source: Box::new(e),
                        });
                    }
                }
            }

            let finished_at = Utc::now();
            self.emit(PipelineEvent::PipelineFinished {
                processed: results.len(),
                finished_at,
            })
            .await;
            info!(processed = results.len(), "pipeline finished");

            Ok(PipelineReport {
                run_id,
                started_at,
                finished_at,
                results,
            })
        }
        .instrument(span)
        .await
    }

    /// Full life cycle of one alignment.
    async fn process(
        &self,
        alignment: &Alignment,
        interrupt_flag: &InterruptFlag,
    ) -> PipelineResult<AlignmentResult> {
        let span = info_span!("alignment", alignment = %alignment.id);
        async {
            let labels = &self.config.polling.chains;
            let chains = alignment.chains(labels, &self.config.output);
            let threads = self.config.polling.effective_threads();

            let mut supervisor = match ChainSupervisor::launch(
                alignment,
                labels,
                threads,
                &self.config.sampler,
                &self.config.output.working_dir,
            ) {
                Ok(supervisor) => supervisor,
                Err(e) => {
                    self.archive_terminated(alignment).await;
                    return Err(e);
                }
            };

            self.emit(PipelineEvent::ChainsLaunched {
                alignment: alignment.id.clone(),
                chains: supervisor.labels(),
                threads_per_chain: threads,
            })
            .await;

            let mut monitor = ConvergenceLoop::new(&self.config, Arc::clone(&self.probe))
                .with_interrupt(interrupt_flag.clone());
            if let Some(tx) = &self.events {
                monitor = monitor.with_events(tx.clone());
            }

            let finished = monitor.run(alignment, &chains, &mut supervisor).await;
            supervisor.terminate_all().await;

            let finished = match finished {
                Ok(finished) => finished,
                Err(e) => {
                    self.archive_terminated(alignment).await;
                    return Err(e);
                }
            };

            let row = RunLogRow {
                alignment: alignment.id.clone(),
                converged: finished.outcome == Outcome::Converged,
                statistics: finished.statistics,
                generations: finished.snapshot.generation_values(),
            };
            let archive = self
                .archive
                .archive(alignment, finished.outcome, Some(&row))
                .await?;

            info!(outcome = %finished.outcome, cycles = finished.cycles, "alignment finished");
            self.emit(PipelineEvent::AlignmentFinished {
                alignment: alignment.id.clone(),
                outcome: finished.outcome,
                row: Some(row.clone()),
            })
            .await;

            Ok(AlignmentResult {
                alignment: alignment.id.clone(),
                outcome: finished.outcome,
                row,
                cycles: finished.cycles,
                archive,
            })
        }
        .instrument(span)
        .await
    }

    /// Archive after a failure. An archival error here is logged, not
    /// returned, so the original failure is what the caller sees.
    async fn archive_terminated(&self, alignment: &Alignment) {
        match self
            .archive
            .archive(alignment, Outcome::TerminatedByError, None)
            .await
        {
            Ok(report) => {
                self.emit(PipelineEvent::AlignmentFinished {
                    alignment: alignment.id.clone(),
                    outcome: Outcome::TerminatedByError,
                    row: None,
                })
                .await;
                info!(analysis_dir = %report.analysis_dir.display(), "terminated alignment archived");
            }
            Err(e) => {
                error!(error = %e, "failed to archive terminated alignment");
            }
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
