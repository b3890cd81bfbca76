//! Sampler progress from trace files.
//!
//! The sampler appends one line per generation to `<chain>.trace`, after a
//! single header line.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::trace;

use crate::domain::errors::{PipelineError, PipelineResult};

/// Number of generations recorded in a trace file.
///
/// A file that does not exist yet means the sampler has not started writing
/// and counts as zero progress.
pub async fn progress(path: &Path) -> PipelineResult<u64> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!(path = %path.display(), "trace file not created yet");
            return Ok(0);
        }
        Err(source) => {
            return Err(PipelineError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut lines = BufReader::new(file).lines();
    let mut count: u64 = 0;
    while lines
        .next_line()
        .await
        .map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .is_some()
    {
        count += 1;
    }

    // header line
    Ok(count.saturating_sub(1))
}
