//! External comparison tools as a [`StatisticsProbe`].
//!
//! Runs the trace comparator and the bipartition comparator in the working
//! directory, then reads one configured line from each result file.
//!
//! Result files are rewritten in place at fixed paths and outlive the run
//! that produced them, so each one is removed before its tool runs. A result
//! read afterwards can only come from the current invocation.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use crate::domain::errors::ProbeError;
use crate::domain::models::{OutputConfig, Statistics, ToolsConfig};
use crate::domain::ports::StatisticsProbe;

/// Field (1-based) of the log-likelihood line holding the effective size.
const EFFSIZE_FIELD: usize = 2;
/// Field (1-based) of the log-likelihood line holding the relative difference.
const REL_DIFF_FIELD: usize = 3;
/// Field (1-based) of the bipartition line holding the maximum difference.
const MAX_DIFF_FIELD: usize = 3;

/// Probe backed by the `tracecomp` / `bpcomp` style command-line tools.
#[derive(Debug, Clone)]
pub struct ExternalStatisticsProbe {
    tools: ToolsConfig,
    output: OutputConfig,
}

impl ExternalStatisticsProbe {
    pub const fn new(tools: ToolsConfig, output: OutputConfig) -> Self {
        Self { tools, output }
    }

    fn result_path(&self, file: &Path) -> PathBuf {
        self.output.working_dir.join(file)
    }

    /// Run one tool to completion, discarding its console output.
    async fn invoke(&self, program: &str, args: &[String]) -> Result<(), ProbeError> {
        debug!(program, ?args, "running comparison tool");

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.output.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| ProbeError::Spawn {
                tool: program.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(ProbeError::ToolFailed {
                tool: program.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Delete a previous result file; absence is the expected state.
async fn clear_result(path: &Path) -> Result<(), ProbeError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            trace!(path = %path.display(), "removed previous result file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProbeError::StaleOutput {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[async_trait]
impl StatisticsProbe for ExternalStatisticsProbe {
    #[instrument(skip(self), fields(tracecomp = %self.tools.tracecomp, bpcomp = %self.tools.bpcomp))]
    async fn run(
        &self,
        chains: &[String],
        discard: u64,
        tree_sample_interval: u64,
    ) -> Result<Statistics, ProbeError> {
        let trace_result = self.result_path(&self.output.tracecomp);
        let bp_result = self.result_path(&self.output.bpcomp);
        clear_result(&trace_result).await?;
        clear_result(&bp_result).await?;

        let mut trace_args = vec!["-x".to_string(), discard.to_string()];
        trace_args.extend(chains.iter().cloned());
        self.invoke(&self.tools.tracecomp, &trace_args).await?;

        let mut bp_args = vec![
            "-x".to_string(),
            discard.to_string(),
            tree_sample_interval.to_string(),
        ];
        bp_args.extend(chains.iter().cloned());
        self.invoke(&self.tools.bpcomp, &bp_args).await?;

        let (effsize, loglik_rel_diff) =
            parse_tracecomp(&trace_result, self.output.loglik_line).await?;
        let max_diff = parse_bpcomp(&bp_result, self.output.max_diff_line).await?;

        let statistics = Statistics {
            effsize,
            loglik_rel_diff,
            max_diff,
        };
        debug!(?statistics, "comparison tools finished");
        Ok(statistics)
    }
}

/// Effective size and relative difference from the trace comparator output.
pub async fn parse_tracecomp(path: &Path, line: usize) -> Result<(u64, f64), ProbeError> {
    let fields = read_fields(path, line, REL_DIFF_FIELD).await?;
    let effsize = parse_field(path, line, &fields, EFFSIZE_FIELD)?;
    let rel_diff = parse_field(path, line, &fields, REL_DIFF_FIELD)?;
    Ok((effsize, rel_diff))
}

/// Maximum bipartition difference from the bipartition comparator output.
pub async fn parse_bpcomp(path: &Path, line: usize) -> Result<f64, ProbeError> {
    let fields = read_fields(path, line, MAX_DIFF_FIELD).await?;
    parse_field(path, line, &fields, MAX_DIFF_FIELD)
}

/// Whitespace-separated fields of a 1-based line, requiring `expected` of them.
async fn read_fields(path: &Path, line: usize, expected: usize) -> Result<Vec<String>, ProbeError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ProbeError::MissingOutput {
            path: path.to_path_buf(),
            source,
        })?;

    let text = line
        .checked_sub(1)
        .and_then(|index| contents.lines().nth(index))
        .ok_or_else(|| ProbeError::MissingLine {
            path: path.to_path_buf(),
            line,
        })?;

    let fields: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    if fields.len() < expected {
        return Err(ProbeError::FieldCount {
            path: path.to_path_buf(),
            line,
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

fn parse_field<T: FromStr>(
    path: &Path,
    line: usize,
    fields: &[String],
    field: usize,
) -> Result<T, ProbeError> {
    let value = fields
        .get(field.saturating_sub(1))
        .ok_or_else(|| ProbeError::FieldCount {
            path: path.to_path_buf(),
            line,
            expected: field,
            found: fields.len(),
        })?;
    value.parse().map_err(|_| ProbeError::InvalidNumber {
        path: path.to_path_buf(),
        line,
        field,
        value: value.clone(),
    })
}
