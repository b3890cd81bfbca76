//! Statistics probe port - interface to the convergence comparison tools.

use async_trait::async_trait;

use crate::domain::errors::ProbeError;
use crate::domain::models::Statistics;

/// Computes convergence statistics over the chains' accumulated output.
///
/// One call runs both comparison tools to completion. Callers must not
/// overlap calls: the tools rewrite their result files in place.
///
/// # Examples
///
/// ```no_run
/// use phylomatic::domain::ports::StatisticsProbe;
///
/// async fn example(probe: &dyn StatisticsProbe) -> anyhow::Result<()> {
///     let chains = vec!["chain_1".to_string(), "chain_2".to_string()];
///     let stats = probe.run(&chains, 150, 10).await?;
///     println!("effsize = {}", stats.effsize);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StatisticsProbe: Send + Sync {
    /// Run the comparison tools and parse their results.
    ///
    /// # Arguments
    ///
    /// * `chains` - Chain labels, in report order
    /// * `discard` - Leading samples excluded as burn-in
    /// * `tree_sample_interval` - Stride used when sampling trees
    async fn run(
        &self,
        chains: &[String],
        discard: u64,
        tree_sample_interval: u64,
    ) -> Result<Statistics, ProbeError>;
}
