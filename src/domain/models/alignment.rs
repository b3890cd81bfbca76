//! Alignment and chain domain models.
//!
//! An alignment is one input dataset. Each alignment is sampled by a fixed
//! set of chains, every chain being one external sampler process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::config::OutputConfig;

/// An input dataset, identified by its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alignment {
    /// Identifier derived from the file name with its extension stripped
    pub id: String,
    /// Location of the dataset
    pub path: PathBuf,
}

impl Alignment {
    /// Build an alignment from a dataset path.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| PipelineError::Discovery {
                path: path.to_path_buf(),
                reason: "cannot derive an alignment name".to_string(),
            })?;

        Ok(Self {
            id: id.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Chain records for the given labels, in label order.
    pub fn chains(&self, labels: &[String], output: &OutputConfig) -> Vec<Chain> {
        labels
            .iter()
            .map(|label| Chain {
                alignment: self.id.clone(),
                label: label.clone(),
                trace_path: output.trace_path(label),
            })
            .collect()
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// One sampler run for an alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// Owning alignment id
    pub alignment: String,
    /// Chain name passed to the sampler
    pub label: String,
    /// Incrementally appended progress file
    pub trace_path: PathBuf,
}
