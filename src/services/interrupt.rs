//! SIGINT handling for a pipeline run
//!
//! One listener is installed per run and turns SIGINT into a flag on a
//! `watch` channel. Once installed, SIGINT no longer kills the process, so
//! the pipeline polls the flag at its own checkpoints and takes the abnormal
//! path from there.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::domain::errors::{PipelineError, PipelineResult};

/// Receiver side of the interrupt flag.
pub type InterruptFlag = watch::Receiver<bool>;

/// Listener task owning the signal stream. Stops when dropped.
pub struct Listener(JoinHandle<()>);

impl Drop for Listener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Install the SIGINT listener.
pub fn listen() -> PipelineResult<(InterruptFlag, Listener)> {
    let mut interrupts = signal(SignalKind::interrupt()).map_err(PipelineError::SignalHandler)?;
    let (tx, rx) = watch::channel(false);

    let listener = tokio::spawn(async move {
        while interrupts.recv().await.is_some() {
            warn!("interrupt received, stopping after the current step");
            tx.send_replace(true);
        }
    });

    Ok((rx, Listener(listener)))
}

/// Whether an interrupt has been seen.
pub fn requested(flag: &InterruptFlag) -> bool {
    *flag.borrow()
}

/// Resolves once an interrupt is seen. Never resolves if the sender is gone
/// without one.
pub async fn wait(flag: &mut InterruptFlag) {
    if flag.wait_for(|&set| set).await.is_err() {
        std::future::pending::<()>().await;
    }
}
