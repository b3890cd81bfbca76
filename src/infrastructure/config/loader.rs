use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project configuration, created by `phylomatic config save`
pub const PROJECT_CONFIG: &str = ".phylomatic/config.yaml";

/// Optional local overrides, never written by the tool
pub const LOCAL_CONFIG: &str = ".phylomatic/local.yaml";

/// Prefix of environment overrides; `__` separates nested keys
pub const ENV_PREFIX: &str = "PHYLOMATIC_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid poll_interval_ms: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error("At least one chain label is required")]
    NoChains,

    #[error("Chain label {0:?} is empty or duplicated")]
    InvalidChainLabel(String),

    #[error("Invalid threads_per_chain: {0}. Must be at least 1")]
    InvalidThreads(usize),

    #[error("Sampler program cannot be empty")]
    EmptySamplerProgram,

    #[error("Invalid threshold {name}: {value}. Must be finite and non-negative")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid {name}: {value}. Line numbers start at 1")]
    InvalidLineNumber { name: &'static str, value: usize },

    #[error("Chain extensions {0:?} and {1:?} overlap; a file could match both")]
    OverlappingExtensions(String, String),

    #[error("At least one chain extension is required")]
    NoChainExtensions,

    #[error("At least one input file type is required")]
    NoInputFiletypes,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .phylomatic/config.yaml (project config)
    /// 3. .phylomatic/local.yaml (project local overrides, optional)
    /// 4. Environment variables (PHYLOMATIC_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::extract(
            Self::defaults()
                .merge(Yaml::file(PROJECT_CONFIG))
                .merge(Yaml::file(LOCAL_CONFIG))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
        .context("Failed to load project configuration")
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Configuration file {} does not exist", path.display());
        }

        Self::extract(
            Self::defaults()
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
        .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    /// Persist a configuration as the new defaults
    ///
    /// This is an administrative operation; it never runs while a pipeline
    /// is monitoring chains.
    pub fn save(config: &Config, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        Self::validate(config)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    fn defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Polling
        if config.polling.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(
                config.polling.poll_interval_ms,
            ));
        }

        if config.polling.chains.is_empty() {
            return Err(ConfigError::NoChains);
        }

        let mut labels = HashSet::new();
        for label in &config.polling.chains {
            if label.trim().is_empty() || !labels.insert(label.as_str()) {
                return Err(ConfigError::InvalidChainLabel(label.clone()));
            }
        }

        if config.polling.threads_per_chain == Some(0) {
            return Err(ConfigError::InvalidThreads(0));
        }

        if config.sampler.program.trim().is_empty() {
            return Err(ConfigError::EmptySamplerProgram);
        }

        // Thresholds
        for (name, value) in [
            ("min_loglik_rel_diff", config.thresholds.min_loglik_rel_diff),
            ("min_maxdiff", config.thresholds.min_maxdiff),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        // Result files
        for (name, value) in [
            ("loglik_line", config.output.loglik_line),
            ("max_diff_line", config.output.max_diff_line),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidLineNumber { name, value });
            }
        }

        // Each artifact must match at most one extension
        let extensions = &config.output.chain_extensions;
        if extensions.is_empty() {
            return Err(ConfigError::NoChainExtensions);
        }
        for (i, a) in extensions.iter().enumerate() {
            for b in &extensions[i + 1..] {
                if a.ends_with(b.as_str()) || b.ends_with(a.as_str()) {
                    return Err(ConfigError::OverlappingExtensions(a.clone(), b.clone()));
                }
            }
        }

        if config.input.filetypes.is_empty() {
            return Err(ConfigError::NoInputFiletypes);
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
