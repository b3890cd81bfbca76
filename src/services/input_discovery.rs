//! Alignment discovery.
//!
//! Inputs mix files and directories. Files are taken as given; directories
//! contribute the entries whose name ends with an accepted extension. The
//! list is built once, before any sampler starts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::Alignment;

/// Expand input paths into alignments, in input order.
///
/// Directory entries are sorted by name. Paths are made absolute so that
/// samplers running in another working directory can still find them.
pub async fn discover(inputs: &[PathBuf], filetypes: &[String]) -> PipelineResult<Vec<Alignment>> {
    let mut alignments = Vec::new();
    let mut seen_ids = HashSet::new();

    for input in inputs {
        let metadata = fs::metadata(input).await.map_err(|e| PipelineError::Discovery {
            path: input.clone(),
            reason: e.to_string(),
        })?;

        let paths = if metadata.is_dir() {
            scan_directory(input, filetypes).await?
        } else {
            vec![input.clone()]
        };

        for path in paths {
            let absolute = fs::canonicalize(&path)
                .await
                .map_err(|e| PipelineError::Discovery {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            let alignment = Alignment::from_path(absolute)?;

            if !seen_ids.insert(alignment.id.clone()) {
                return Err(PipelineError::Discovery {
                    path,
                    reason: format!("alignment name {:?} is used twice", alignment.id),
                });
            }
            alignments.push(alignment);
        }
    }

    if alignments.is_empty() {
        return Err(PipelineError::NoAlignments);
    }

    info!(count = alignments.len(), "alignments discovered");
    Ok(alignments)
}

/// Whether a file name carries one of the accepted extensions.
pub fn is_accepted(file_name: &str, filetypes: &[String]) -> bool {
    filetypes.iter().any(|ext| file_name.ends_with(ext.as_str()))
}

async fn scan_directory(dir: &Path, filetypes: &[String]) -> PipelineResult<Vec<PathBuf>> {
    let to_error = |e: std::io::Error| PipelineError::Discovery {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut entries = fs::read_dir(dir).await.map_err(to_error)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(to_error)? {
        if !entry.file_type().await.map_err(to_error)?.is_file() {
            continue;
        }
        let accepted = entry
            .file_name()
            .to_str()
            .is_some_and(|name| is_accepted(name, filetypes));
        if accepted {
            found.push(entry.path());
        } else {
            debug!(path = %entry.path().display(), "skipping non-alignment file");
        }
    }

    found.sort();
    Ok(found)
}
