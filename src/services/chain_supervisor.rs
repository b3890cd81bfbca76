//! Sampler process supervisor
//!
//! Owns the sampler processes of one alignment. Each sampler is started in
//! its own process group so that a termination signal also reaches the
//! workers it forks (e.g. MPI ranks).
//!
//! The group id is recorded at launch. Signals go to the group even after
//! the leader itself has exited and been reaped, since its workers may
//! still be running.
//!
//! Dropping the supervisor kills whatever is still running, so every exit
//! path of an alignment, including early returns on error, leaves no
//! sampler behind.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{Alignment, SamplerConfig};

/// How long a sampler gets to exit after SIGTERM before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

struct RunningChain {
    label: String,
    child: Child,
    /// Process group led by the sampler, equal to its pid.
    pgid: Pid,
    exited: Option<ExitStatus>,
}

/// Running samplers for one alignment.
pub struct ChainSupervisor {
    alignment: String,
    chains: Vec<RunningChain>,
    shutdown_grace: Duration,
}

impl ChainSupervisor {
    /// Start one sampler per chain label.
    ///
    /// If any launch fails, the samplers already started are killed when the
    /// partially built supervisor is dropped.
    pub fn launch(
        alignment: &Alignment,
        chain_labels: &[String],
        threads_per_chain: usize,
        sampler: &SamplerConfig,
        working_dir: &Path,
    ) -> PipelineResult<Self> {
        let mut supervisor = Self {
            alignment: alignment.id.clone(),
            chains: Vec::with_capacity(chain_labels.len()),
            shutdown_grace: SHUTDOWN_GRACE,
        };

        for label in chain_labels {
            let args = sampler_args(sampler, alignment, label, threads_per_chain);
            info!(
                alignment = %alignment.id,
                chain = %label,
                program = %sampler.program,
                ?args,
                "starting sampler"
            );

            let child = Command::new(&sampler.program)
                .args(&args)
                .current_dir(working_dir)
                .process_group(0)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| PipelineError::Launch {
                    chain: label.clone(),
                    source,
                })?;

            let pgid = child
                .id()
                .and_then(|pid| i32::try_from(pid).ok())
                .map(Pid::from_raw)
                .ok_or_else(|| PipelineError::Launch {
                    chain: label.clone(),
                    source: std::io::Error::other("sampler has no usable process id"),
                })?;

            supervisor.chains.push(RunningChain {
                label: label.clone(),
                child,
                pgid,
                exited: None,
            });
        }

        Ok(supervisor)
    }

    /// Override how long samplers get between SIGTERM and SIGKILL.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Chain labels in launch order.
    pub fn labels(&self) -> Vec<String> {
        self.chains.iter().map(|c| c.label.clone()).collect()
    }

    /// OS process ids of samplers not yet reaped.
    pub fn pids(&self) -> Vec<u32> {
        self.chains.iter().filter_map(|c| c.child.id()).collect()
    }

    /// Whether any sampler handle is still held.
    pub fn is_running(&self) -> bool {
        !self.chains.is_empty()
    }

    /// Samplers that exited on their own since the last call.
    ///
    /// Each exit is reported once. The caller decides what an early exit
    /// means; the supervisor keeps the handle until termination.
    pub fn poll_exits(&mut self) -> Vec<(String, ExitStatus)> {
        let mut newly_exited = Vec::new();
        for chain in &mut self.chains {
            if chain.exited.is_some() {
                continue;
            }
            match chain.child.try_wait() {
                Ok(Some(status)) => {
                    chain.exited = Some(status);
                    newly_exited.push((chain.label.clone(), status));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(chain = %chain.label, error = ?e, "could not poll sampler status");
                }
            }
        }
        newly_exited
    }

    /// Terminate every sampler, best-effort.
    ///
    /// Sends SIGTERM to every sampler's process group at once, then waits for
    /// all of them against a single grace deadline. Groups still alive after
    /// the deadline, including workers whose leader already exited, get
    /// SIGKILL. Handles are released, so calling this again is a no-op.
    ///
    /// Returns the number of groups that received SIGTERM.
    pub async fn terminate_all(&mut self) -> usize {
        let mut chains = std::mem::take(&mut self.chains);
        if chains.is_empty() {
            debug!(alignment = %self.alignment, "no samplers left to terminate");
            return 0;
        }

        info!(alignment = %self.alignment, count = chains.len(), "terminating samplers");

        let signalled = chains
            .iter()
            .filter(|chain| signal_group(chain.pgid, Signal::SIGTERM))
            .count();

        let deadline = Instant::now() + self.shutdown_grace;
        for chain in &mut chains {
            if chain.exited.is_some() {
                continue;
            }
            match tokio::time::timeout_at(deadline, chain.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(chain = %chain.label, ?status, "sampler exited");
                    chain.exited = Some(status);
                }
                Ok(Err(e)) => {
                    error!(chain = %chain.label, error = ?e, "error waiting for sampler to exit");
                }
                Err(_) => {
                    warn!(chain = %chain.label, "sampler shutdown timeout, forcing kill");
                }
            }
        }

        for chain in &mut chains {
            if signal_group(chain.pgid, Signal::SIGKILL) {
                debug!(chain = %chain.label, "killed what remained of the sampler group");
            }
            if chain.exited.is_none() {
                let _ = chain.child.kill().await;
            }
        }

        signalled
    }
}

impl Drop for ChainSupervisor {
    fn drop(&mut self) {
        for chain in &mut self.chains {
            if signal_group(chain.pgid, Signal::SIGKILL) {
                warn!(chain = %chain.label, pgid = chain.pgid.as_raw(), "sampler still running on drop, killed");
            }
            let _ = chain.child.start_kill();
        }
    }
}

/// Signal a sampler's process group. Returns whether the signal was delivered.
fn signal_group(pgid: Pid, signal: Signal) -> bool {
    match killpg(pgid, signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => {
            debug!(pgid = pgid.as_raw(), ?signal, "sampler group already gone");
            false
        }
        Err(e) => {
            warn!(pgid = pgid.as_raw(), ?signal, error = %e, "failed to signal sampler group");
            false
        }
    }
}

/// Sampler arguments with the per-chain placeholders filled in.
pub fn sampler_args(
    sampler: &SamplerConfig,
    alignment: &Alignment,
    chain_label: &str,
    threads: usize,
) -> Vec<String> {
    let alignment_path = alignment.path.to_string_lossy();
    let threads = threads.to_string();
    sampler
        .args
        .iter()
        .map(|arg| {
            arg.replace("{threads}", &threads)
                .replace("{alignment}", &alignment_path)
                .replace("{chain}", chain_label)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alignment() -> Alignment {
        Alignment::from_path("/data/primates.phy").unwrap()
    }

    fn sleeper() -> SamplerConfig {
        SamplerConfig {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        }
    }

    /// Zombies count as dead: they are gone, just not reaped yet.
    fn is_alive(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .and_then(|(_, rest)| rest.trim_start().chars().next())
            })
            .is_some_and(|state| state != 'Z')
    }

    #[test]
    fn test_sampler_args_substitution() {
        let args = sampler_args(&SamplerConfig::default(), &alignment(), "chain_2", 4);
        assert_eq!(
            args,
            vec![
                "-np",
                "4",
                "pb_mpi",
                "-cat",
                "-gtr",
                "-dgam",
                "4",
                "-d",
                "/data/primates.phy",
                "chain_2"
            ]
        );
    }

    #[tokio::test]
    async fn test_terminate_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let labels = vec!["a".to_string(), "b".to_string()];
        let mut supervisor =
            ChainSupervisor::launch(&alignment(), &labels, 1, &sleeper(), dir.path()).unwrap();

        let pids = supervisor.pids();
        assert_eq!(pids.len(), 2);
        assert!(pids.iter().all(|pid| is_alive(*pid)));

        assert_eq!(supervisor.terminate_all().await, 2);
        assert!(!supervisor.is_running());
        assert!(pids.iter().all(|pid| !is_alive(*pid)));

        assert_eq!(supervisor.terminate_all().await, 0);
        assert!(pids.iter().all(|pid| !is_alive(*pid)));
    }

    #[tokio::test]
    async fn test_terminate_tolerates_already_exited() {
        let dir = tempfile::tempdir().unwrap();
        let quick = SamplerConfig {
            program: "true".to_string(),
            args: vec![],
        };
        let mut supervisor =
            ChainSupervisor::launch(&alignment(), &["a".to_string()], 1, &quick, dir.path())
                .unwrap();

        let mut exits = Vec::new();
        for _ in 0..50 {
            exits.extend(supervisor.poll_exits());
            if !exits.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(exits.len(), 1);
        assert!(supervisor.poll_exits().is_empty(), "exit reported once");

        assert_eq!(supervisor.terminate_all().await, 0);
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_launch_failure_reports_chain() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SamplerConfig {
            program: "phylomatic-no-such-sampler".to_string(),
            args: vec![],
        };
        let result =
            ChainSupervisor::launch(&alignment(), &["a".to_string()], 1, &missing, dir.path());

        assert!(matches!(result, Err(PipelineError::Launch { chain, .. }) if chain == "a"));
    }

    fn shell(script: &str) -> SamplerConfig {
        SamplerConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    async fn gone_within(pid: u32, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if !is_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        !is_alive(pid)
    }

    #[tokio::test]
    async fn test_terminate_reaches_workers_of_exited_leader() {
        let dir = tempfile::tempdir().unwrap();
        let forking = shell("sleep 60 & echo $! > worker.pid; exit 0");
        let mut supervisor =
            ChainSupervisor::launch(&alignment(), &["a".to_string()], 1, &forking, dir.path())
                .unwrap();

        let mut exits = Vec::new();
        for _ in 0..100 {
            exits.extend(supervisor.poll_exits());
            if !exits.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(exits.len(), 1, "leader exits on its own");
        assert!(supervisor.pids().is_empty(), "leader has been reaped");

        let worker: u32 = std::fs::read_to_string(dir.path().join("worker.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(is_alive(worker));

        assert_eq!(supervisor.terminate_all().await, 1);
        assert!(gone_within(worker, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_drop_reaches_workers_of_exited_leader() {
        let dir = tempfile::tempdir().unwrap();
        let forking = shell("sleep 60 & echo $! > worker.pid; exit 0");
        let mut supervisor =
            ChainSupervisor::launch(&alignment(), &["a".to_string()], 1, &forking, dir.path())
                .unwrap();

        let pid_file = dir.path().join("worker.pid");
        for _ in 0..100 {
            supervisor.poll_exits();
            if supervisor.pids().is_empty() && pid_file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let worker: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        drop(supervisor);
        assert!(gone_within(worker, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_stubborn_samplers_share_one_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let labels: Vec<String> = (1..=3).map(|i| format!("chain_{i}")).collect();
        let stubborn = shell("trap '' TERM; sleep 30");
        let mut supervisor =
            ChainSupervisor::launch(&alignment(), &labels, 1, &stubborn, dir.path())
                .unwrap()
                .with_shutdown_grace(Duration::from_millis(500));
        let pids = supervisor.pids();

        // Let the shells install their trap first.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        assert_eq!(supervisor.terminate_all().await, 3);
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_millis(1400),
            "three samplers should not wait out three grace periods: {elapsed:?}"
        );
        for pid in pids {
            assert!(gone_within(pid, Duration::from_secs(2)).await);
        }
    }

    #[tokio::test]
    async fn test_drop_kills_samplers() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor =
            ChainSupervisor::launch(&alignment(), &["a".to_string()], 1, &sleeper(), dir.path())
                .unwrap();
        let pids = supervisor.pids();
        drop(supervisor);

        let mut gone = false;
        for _ in 0..50 {
            if pids.iter().all(|pid| !is_alive(*pid)) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);
    }
}
