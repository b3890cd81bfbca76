use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for Phylomatic
///
/// Built once at startup and handed to each component; never mutated while
/// a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Burn-in and minimum-progress settings
    #[serde(default)]
    pub generations: GenerationsConfig,

    /// Stop criteria
    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    /// Polling cadence and chain layout
    #[serde(default)]
    pub polling: PollingConfig,

    /// Sampler invocation
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Comparison tool programs
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Result files, artifact conventions and archive locations
    #[serde(default)]
    pub output: OutputConfig,

    /// Accepted input datasets
    #[serde(default)]
    pub input: InputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Generation-count settings used before statistics are trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationsConfig {
    /// Upper bound on the burn-in discarded by the comparison tools
    #[serde(default = "default_max_discard")]
    pub max_discard: u64,

    /// Generations every chain must exceed before convergence is judged
    #[serde(default = "default_min_cycles")]
    pub min_cycles: u64,
}

const fn default_max_discard() -> u64 {
    1000
}

const fn default_min_cycles() -> u64 {
    100
}

impl Default for GenerationsConfig {
    fn default() -> Self {
        Self {
            max_discard: default_max_discard(),
            min_cycles: default_min_cycles(),
        }
    }
}

/// Convergence thresholds and the generation ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdsConfig {
    /// Generation ceiling; once every chain is past it the run stops unconverged
    #[serde(default = "default_max_gen")]
    pub max_gen: u64,

    /// Log-likelihood relative difference must fall below this
    #[serde(default = "default_min_loglik_rel_diff")]
    pub min_loglik_rel_diff: f64,

    /// Log-likelihood effective size must rise above this
    #[serde(default = "default_max_loglik_effsize")]
    pub max_loglik_effsize: u64,

    /// Maximum bipartition difference must fall below this
    #[serde(default = "default_min_maxdiff")]
    pub min_maxdiff: f64,
}

const fn default_max_gen() -> u64 {
    30_000
}

const fn default_min_loglik_rel_diff() -> f64 {
    0.3
}

const fn default_max_loglik_effsize() -> u64 {
    300
}

const fn default_min_maxdiff() -> f64 {
    0.1
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            max_gen: default_max_gen(),
            min_loglik_rel_diff: default_min_loglik_rel_diff(),
            max_loglik_effsize: default_max_loglik_effsize(),
            min_maxdiff: default_min_maxdiff(),
        }
    }
}

/// Polling cadence and chain layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PollingConfig {
    /// Tree sampling stride passed to the bipartition comparator
    #[serde(default = "default_tree_sample_freq")]
    pub tree_sample_freq: u64,

    /// Wait between convergence checks, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Chain labels launched for every alignment, in report order
    #[serde(default = "default_chains")]
    pub chains: Vec<String>,

    /// Threads given to each sampler; derived from the CPU count when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_per_chain: Option<usize>,
}

const fn default_tree_sample_freq() -> u64 {
    10
}

const fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_chains() -> Vec<String> {
    vec!["chain_1".to_string(), "chain_2".to_string()]
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tree_sample_freq: default_tree_sample_freq(),
            poll_interval_ms: default_poll_interval_ms(),
            chains: default_chains(),
            threads_per_chain: None,
        }
    }
}

impl PollingConfig {
    /// Threads per chain, splitting the available CPUs evenly when not configured.
    pub fn effective_threads(&self) -> usize {
        self.threads_per_chain.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
            (cpus / self.chains.len().max(1)).max(1)
        })
    }
}

/// Sampler command template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SamplerConfig {
    /// Program to execute
    #[serde(default = "default_sampler_program")]
    pub program: String,

    /// Arguments; `{threads}`, `{alignment}` and `{chain}` are substituted per chain
    #[serde(default = "default_sampler_args")]
    pub args: Vec<String>,
}

fn default_sampler_program() -> String {
    "mpirun".to_string()
}

fn default_sampler_args() -> Vec<String> {
    ["-np", "{threads}", "pb_mpi", "-cat", "-gtr", "-dgam", "4", "-d", "{alignment}", "{chain}"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            program: default_sampler_program(),
            args: default_sampler_args(),
        }
    }
}

/// Comparison tool programs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolsConfig {
    /// Trace comparator
    #[serde(default = "default_tracecomp_program")]
    pub tracecomp: String,

    /// Bipartition comparator
    #[serde(default = "default_bpcomp_program")]
    pub bpcomp: String,
}

fn default_tracecomp_program() -> String {
    "tracecomp".to_string()
}

fn default_bpcomp_program() -> String {
    "bpcomp".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tracecomp: default_tracecomp_program(),
            bpcomp: default_bpcomp_program(),
        }
    }
}

/// Result files, artifact naming and archive locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    /// Trace comparator result file, relative to the working directory
    #[serde(default = "default_tracecomp_file")]
    pub tracecomp: PathBuf,

    /// 1-based line of the trace comparator result holding the log-likelihood row
    #[serde(default = "default_loglik_line")]
    pub loglik_line: usize,

    /// Bipartition comparator result file, relative to the working directory
    #[serde(default = "default_bpcomp_file")]
    pub bpcomp: PathBuf,

    /// 1-based line of the bipartition comparator result holding the max difference
    #[serde(default = "default_max_diff_line")]
    pub max_diff_line: usize,

    /// Consensus tree written by the bipartition comparator
    #[serde(default = "default_summary_tree")]
    pub summary_tree: PathBuf,

    /// Suffixes identifying per-chain artifacts
    #[serde(default = "default_chain_extensions")]
    pub chain_extensions: Vec<String>,

    /// Directory the samplers and comparison tools run in
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Archive root
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Run log file name inside the archive root
    #[serde(default = "default_run_log")]
    pub run_log: PathBuf,
}

fn default_tracecomp_file() -> PathBuf {
    PathBuf::from("tracecomp.contdiff")
}

const fn default_loglik_line() -> usize {
    2
}

fn default_bpcomp_file() -> PathBuf {
    PathBuf::from("bpcomp.bpdiff")
}

const fn default_max_diff_line() -> usize {
    1
}

fn default_summary_tree() -> PathBuf {
    PathBuf::from("bpcomp.con.tre")
}

fn default_chain_extensions() -> Vec<String> {
    [".chain", ".monitor", ".param", ".run", ".trace", ".treelist"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("phylomatic_output")
}

fn default_run_log() -> PathBuf {
    PathBuf::from("run_log.csv")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            tracecomp: default_tracecomp_file(),
            loglik_line: default_loglik_line(),
            bpcomp: default_bpcomp_file(),
            max_diff_line: default_max_diff_line(),
            summary_tree: default_summary_tree(),
            chain_extensions: default_chain_extensions(),
            working_dir: default_working_dir(),
            directory: default_output_directory(),
            run_log: default_run_log(),
        }
    }
}

impl OutputConfig {
    /// Progress file of a chain inside the working directory.
    pub fn trace_path(&self, chain_label: &str) -> PathBuf {
        self.working_dir.join(format!("{chain_label}.trace"))
    }

    /// Run log location inside the archive root.
    pub fn run_log_path(&self) -> PathBuf {
        self.directory.join(&self.run_log)
    }
}

/// Accepted input datasets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InputConfig {
    /// File extensions picked up when a directory is given as input
    #[serde(default = "default_filetypes")]
    pub filetypes: Vec<String>,
}

fn default_filetypes() -> Vec<String> {
    [".phy", ".ali", ".fasta", ".nex"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            filetypes: default_filetypes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Rotation policy for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
