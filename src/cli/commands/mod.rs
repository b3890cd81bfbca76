//! CLI command implementations.

pub mod config;
pub mod run;

use anyhow::Result;
use clap::Args;
use std::path::Path;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Command-line overrides, applied on top of every other configuration source.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Threads given to each chain's sampler
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Generation limit; chains past it stop unconverged
    #[arg(long, value_name = "N")]
    pub max_gen: Option<u64>,

    /// Largest log-likelihood relative difference accepted as converged
    #[arg(long, value_name = "F")]
    pub max_loglik: Option<f64>,

    /// Smallest log-likelihood effective size accepted as converged
    #[arg(long, value_name = "N")]
    pub min_size: Option<u64>,

    /// Largest bipartition max difference accepted as converged
    #[arg(long, value_name = "F")]
    pub max_maxdiff: Option<f64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(threads) = self.threads {
            config.polling.threads_per_chain = Some(threads);
        }
        if let Some(max_gen) = self.max_gen {
            config.thresholds.max_gen = max_gen;
        }
        if let Some(rel_diff) = self.max_loglik {
            config.thresholds.min_loglik_rel_diff = rel_diff;
        }
        if let Some(effsize) = self.min_size {
            config.thresholds.max_loglik_effsize = effsize;
        }
        if let Some(max_diff) = self.max_maxdiff {
            config.thresholds.min_maxdiff = max_diff;
        }
    }
}

/// Load the layered configuration, apply overrides and validate the result.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    overrides.apply(&mut config);
    ConfigLoader::validate(&config)?;
    Ok(config)
}
