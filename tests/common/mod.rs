//! Common test utilities for integration tests
//!
//! Provides a scratch workspace with fake sampler and comparison tools.
//! The fakes are shell scripts whose behavior is steered through files in
//! the workspace's `bin` directory:
//!
//! - `generations_<chain>`: data lines the sampler writes to `<chain>.trace`
//! - `statistics`: `effsize rel_diff max_diff` reported by the comparators
//! - `malformed`: when present, the bipartition comparator writes a broken line
//! - `pids`: one line per sampler process started
//! - `tracecomp.calls`: one line per trace comparator run

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use phylomatic::domain::models::{Alignment, Config, PipelineEvent};

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 50ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    predicate()
}

/// Whether a process exists and is not a zombie.
pub fn is_alive(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            // The state follows the parenthesised command name.
            let after_name = stat.rsplit_once(')')?.1;
            after_name.split_whitespace().next().map(|s| s != "Z")
        })
        .unwrap_or(false)
}

/// Drain every event currently queued on a receiver.
pub fn drain_events(rx: &mut tokio::sync::mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

const SAMPLER: &str = r#"#!/bin/sh
chain="$1"
echo $$ >> "@BIN@/pids"
gens=$(cat "@BIN@/generations_$chain" 2>/dev/null || echo 0)
echo "iter loglik" > "$chain.trace.tmp"
if [ "$gens" -gt 0 ]; then
  seq 1 "$gens" >> "$chain.trace.tmp"
fi
mv "$chain.trace.tmp" "$chain.trace"
: > "$chain.chain"
: > "$chain.param"
: > "$chain.treelist"
exec sleep 600
"#;

const TRACECOMP: &str = r#"#!/bin/sh
echo "$@" >> "@BIN@/tracecomp.calls"
read effsize rel max < "@BIN@/statistics"
printf 'name effsize rel_diff\nloglik %s %s\n' "$effsize" "$rel" > tracecomp.contdiff
"#;

const BPCOMP: &str = r#"#!/bin/sh
read effsize rel max < "@BIN@/statistics"
if [ -e "@BIN@/malformed" ]; then
  echo "maxdiff" > bpcomp.bpdiff
else
  printf 'maxdiff meandiff %s\n' "$max" > bpcomp.bpdiff
fi
echo '((a,b),c);' > bpcomp.con.tre
"#;

/// Scratch workspace for one pipeline test.
pub struct Harness {
    _dir: TempDir,
    pub bin: PathBuf,
    pub data: PathBuf,
    pub work: PathBuf,
    pub archive: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let dir = temp_dir();
        let root = dir.path().to_path_buf();
        let harness = Self {
            _dir: dir,
            bin: root.join("bin"),
            data: root.join("data"),
            work: root.join("work"),
            archive: root.join("archive"),
        };
        for path in [&harness.bin, &harness.data, &harness.work] {
            std::fs::create_dir_all(path).unwrap();
        }

        harness.write_script("sampler.sh", SAMPLER);
        harness.write_script("tracecomp.sh", TRACECOMP);
        harness.write_script("bpcomp.sh", BPCOMP);
        harness.set_statistics(0, 1.0, 1.0);
        harness
    }

    fn write_script(&self, name: &str, template: &str) {
        let path = self.bin.join(name);
        let body = template.replace("@BIN@", &self.bin.to_string_lossy());
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Configuration wired to the fake tools, polling every 50ms.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.polling.poll_interval_ms = 50;
        config.polling.threads_per_chain = Some(1);
        config.sampler.program = self.bin.join("sampler.sh").to_string_lossy().into_owned();
        config.sampler.args = vec!["{chain}".to_string(), "{alignment}".to_string()];
        config.tools.tracecomp = self.bin.join("tracecomp.sh").to_string_lossy().into_owned();
        config.tools.bpcomp = self.bin.join("bpcomp.sh").to_string_lossy().into_owned();
        config.output.working_dir = self.work.clone();
        config.output.directory = self.archive.clone();
        config
    }

    /// Create an (empty) alignment file and return its handle.
    pub fn alignment(&self, name: &str) -> Alignment {
        let path = self.data.join(format!("{name}.phy"));
        std::fs::write(&path, "2 4\nsp1 ACGT\nsp2 ACGA\n").unwrap();
        Alignment::from_path(path).unwrap()
    }

    pub fn set_generations(&self, chain: &str, generations: u64) {
        std::fs::write(self.bin.join(format!("generations_{chain}")), format!("{generations}\n"))
            .unwrap();
    }

    pub fn set_statistics(&self, effsize: u64, rel_diff: f64, max_diff: f64) {
        // Replace atomically; the fake tools may be reading it right now.
        let staging = self.bin.join("statistics.tmp");
        std::fs::write(&staging, format!("{effsize} {rel_diff} {max_diff}\n")).unwrap();
        std::fs::rename(staging, self.bin.join("statistics")).unwrap();
    }

    pub fn break_bipartition_output(&self) {
        std::fs::write(self.bin.join("malformed"), "").unwrap();
    }

    pub fn sampler_pids(&self) -> Vec<u32> {
        read_lines(&self.bin.join("pids"))
            .iter()
            .filter_map(|line| line.trim().parse().ok())
            .collect()
    }

    pub fn probe_calls(&self) -> usize {
        read_lines(&self.bin.join("tracecomp.calls")).len()
    }

    /// Names of files left in the working directory.
    pub fn work_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.work)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn run_log(&self) -> Option<Vec<String>> {
        let path = self.archive.join("run_log.csv");
        path.exists().then(|| read_lines(&path))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
