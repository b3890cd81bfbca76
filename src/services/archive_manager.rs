//! Post-run archival
//!
//! Moves an alignment's chain artifacts and consensus tree out of the working
//! directory into outcome-specific storage and appends the run-log row.
//! Archive layout under the configured root:
//!
//! ```text
//! <root>/analyses/<alignment>/<chain>.<ext>
//! <root>/trees/{converged,not_converged,terminated}/<alignment>.tre
//! <root>/<run_log>
//! ```

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{Alignment, OutputConfig, Outcome, RunLogRow};

/// Where an alignment's artifacts were put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub analysis_dir: PathBuf,
    pub moved_artifacts: Vec<PathBuf>,
    /// Absent only when an error-terminated run never produced a tree
    pub tree: Option<PathBuf>,
    pub row_appended: bool,
}

/// Relocates finished runs into the archive tree.
#[derive(Debug, Clone)]
pub struct ArchiveManager {
    output: OutputConfig,
    chain_labels: Vec<String>,
}

impl ArchiveManager {
    pub const fn new(output: OutputConfig, chain_labels: Vec<String>) -> Self {
        Self {
            output,
            chain_labels,
        }
    }

    pub fn analysis_dir(&self, alignment: &Alignment) -> PathBuf {
        self.output.directory.join("analyses").join(&alignment.id)
    }

    pub fn tree_dir(&self, outcome: Outcome) -> PathBuf {
        self.output.directory.join("trees").join(outcome.as_str())
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.output.run_log_path()
    }

    /// Archive one alignment.
    ///
    /// `row` is appended to the run log unless the outcome is
    /// [`Outcome::TerminatedByError`], for which no final statistics exist.
    #[instrument(skip(self, alignment, row), fields(alignment = %alignment.id))]
    pub async fn archive(
        &self,
        alignment: &Alignment,
        outcome: Outcome,
        row: Option<&RunLogRow>,
    ) -> PipelineResult<ArchiveReport> {
        let analysis_dir = self.analysis_dir(alignment);
        let tree_dir = self.tree_dir(outcome);
        create_dir(&analysis_dir).await?;
        create_dir(&tree_dir).await?;

        let moved_artifacts = self.move_chain_artifacts(&analysis_dir).await?;
        let tree = self.move_summary_tree(alignment, outcome, &tree_dir).await?;

        let row_appended = match (outcome, row) {
            (Outcome::TerminatedByError, _) => false,
            (_, Some(row)) => {
                self.append_row(row).await?;
                true
            }
            (_, None) => {
                warn!("no run-log row supplied for a completed alignment");
                false
            }
        };

        info!(
            artifacts = moved_artifacts.len(),
            tree = ?tree,
            row_appended,
            "alignment archived"
        );

        Ok(ArchiveReport {
            analysis_dir,
            moved_artifacts,
            tree,
            row_appended,
        })
    }

    /// Suffix from the configured set that `file_name` ends with, if any.
    pub fn matching_extension(&self, file_name: &str) -> Option<&str> {
        self.output
            .chain_extensions
            .iter()
            .find(|ext| file_name.ends_with(ext.as_str()))
            .map(String::as_str)
    }

    async fn move_chain_artifacts(&self, analysis_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
        let working_dir = &self.output.working_dir;
        let mut entries = fs::read_dir(working_dir)
            .await
            .map_err(|e| PipelineError::archive(working_dir, e))?;

        let mut moved = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::archive(working_dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| PipelineError::archive(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if self.matching_extension(name).is_none() {
                continue;
            }

            let destination = analysis_dir.join(name);
            move_file(&entry.path(), &destination).await?;
            debug!(file = name, "moved chain artifact");
            moved.push(destination);
        }

        moved.sort();
        Ok(moved)
    }

    async fn move_summary_tree(
        &self,
        alignment: &Alignment,
        outcome: Outcome,
        tree_dir: &Path,
    ) -> PipelineResult<Option<PathBuf>> {
        let source = self.output.working_dir.join(&self.output.summary_tree);
        let destination = tree_dir.join(format!("{}.tre", alignment.id));

        match fs::metadata(&source).await {
            Ok(_) => {
                move_file(&source, &destination).await?;
                Ok(Some(destination))
            }
            Err(e) if e.kind() == ErrorKind::NotFound && outcome == Outcome::TerminatedByError => {
                warn!(path = %source.display(), "no summary tree to archive");
                Ok(None)
            }
            Err(e) => Err(PipelineError::archive(source, e)),
        }
    }

    async fn append_row(&self, row: &RunLogRow) -> PipelineResult<()> {
        let path = self.run_log_path();
        if let Some(parent) = path.parent() {
            create_dir(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PipelineError::archive(&path, e))?;

        let is_new = file
            .metadata()
            .await
            .map_err(|e| PipelineError::archive(&path, e))?
            .len()
            == 0;

        let mut text = String::new();
        if is_new {
            text.push_str(&RunLogRow::header(&self.chain_labels));
            text.push('\n');
        }
        text.push_str(&row.to_line());
        text.push('\n');

        file.write_all(text.as_bytes())
            .await
            .map_err(|e| PipelineError::archive(&path, e))?;
        file.flush()
            .await
            .map_err(|e| PipelineError::archive(&path, e))?;
        Ok(())
    }
}

async fn create_dir(path: &Path) -> PipelineResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| PipelineError::archive(path, e))
}

/// Rename, falling back to copy-and-remove across filesystems.
async fn move_file(source: &Path, destination: &Path) -> PipelineResult<()> {
    if fs::rename(source, destination).await.is_ok() {
        return Ok(());
    }

    fs::copy(source, destination)
        .await
        .map_err(|e| PipelineError::archive(source, e))?;
    fs::remove_file(source)
        .await
        .map_err(|e| PipelineError::archive(source, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Statistics;

    struct Fixture {
        _dir: tempfile::TempDir,
        work: PathBuf,
        manager: ArchiveManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let output = OutputConfig {
            working_dir: work.clone(),
            directory: dir.path().join("archive"),
            ..OutputConfig::default()
        };
        let manager = ArchiveManager::new(output, vec!["chain_1".into(), "chain_2".into()]);
        Fixture {
            _dir: dir,
            work,
            manager,
        }
    }

    fn seed_artifacts(work: &Path) {
        for chain in ["chain_1", "chain_2"] {
            for ext in [".chain", ".trace", ".treelist", ".monitor"] {
                std::fs::write(work.join(format!("{chain}{ext}")), "data").unwrap();
            }
        }
        std::fs::write(work.join("bpcomp.con.tre"), "(a,b);").unwrap();
        std::fs::write(work.join("notes.txt"), "keep me").unwrap();
    }

    fn row(alignment: &str) -> RunLogRow {
        RunLogRow {
            alignment: alignment.to_string(),
            converged: true,
            statistics: Statistics {
                effsize: 350,
                loglik_rel_diff: 0.05,
                max_diff: 0.02,
            },
            generations: vec![1500, 1600],
        }
    }

    fn leftover_artifacts(manager: &ArchiveManager, work: &Path) -> Vec<String> {
        std::fs::read_dir(work)
            .unwrap()
            .filter_map(|e| e.ok()?.file_name().into_string().ok())
            .filter(|name| manager.matching_extension(name).is_some())
            .collect()
    }

    #[tokio::test]
    async fn test_archive_is_total() {
        let f = fixture();
        seed_artifacts(&f.work);
        let alignment = Alignment::from_path("primates.phy").unwrap();

        let report = f
            .manager
            .archive(&alignment, Outcome::Converged, Some(&row("primates")))
            .await
            .unwrap();

        assert!(leftover_artifacts(&f.manager, &f.work).is_empty());
        assert!(f.work.join("notes.txt").exists(), "unrelated files stay");
        assert!(!f.work.join("bpcomp.con.tre").exists());
        assert_eq!(report.moved_artifacts.len(), 8);
        assert!(report.analysis_dir.join("chain_1.trace").exists());

        let tree = report.tree.unwrap();
        assert_eq!(tree, f.manager.tree_dir(Outcome::Converged).join("primates.tre"));
        assert_eq!(std::fs::read_to_string(tree).unwrap(), "(a,b);");
        assert!(report.row_appended);
    }

    #[tokio::test]
    async fn test_run_log_appends_one_row_per_alignment() {
        let f = fixture();
        for name in ["first", "second"] {
            seed_artifacts(&f.work);
            let alignment = Alignment::from_path(format!("{name}.phy")).unwrap();
            f.manager
                .archive(&alignment, Outcome::NotConverged, Some(&row(name)))
                .await
                .unwrap();
        }

        let log = std::fs::read_to_string(f.manager.run_log_path()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("alignment, converged"));
        assert!(lines[0].ends_with("chain_1, chain_2"));
        assert!(lines[1].starts_with("first, "));
        assert!(lines[2].starts_with("second, "));
    }

    #[tokio::test]
    async fn test_terminated_run_skips_log_and_tolerates_missing_tree() {
        let f = fixture();
        std::fs::write(f.work.join("chain_1.trace"), "header\n1\n").unwrap();
        let alignment = Alignment::from_path("broken.phy").unwrap();

        let report = f
            .manager
            .archive(&alignment, Outcome::TerminatedByError, Some(&row("broken")))
            .await
            .unwrap();

        assert!(report.tree.is_none());
        assert!(!report.row_appended);
        assert!(!f.manager.run_log_path().exists());
        assert!(report.analysis_dir.join("chain_1.trace").exists());
        assert!(f.manager.tree_dir(Outcome::TerminatedByError).is_dir());
    }

    #[tokio::test]
    async fn test_missing_tree_is_fatal_for_completed_runs() {
        let f = fixture();
        let alignment = Alignment::from_path("primates.phy").unwrap();

        let result = f
            .manager
            .archive(&alignment, Outcome::Converged, Some(&row("primates")))
            .await;

        assert!(matches!(result, Err(PipelineError::Archive { .. })));
    }

    #[test]
    fn test_matching_extension() {
        let f = fixture();
        assert_eq!(f.manager.matching_extension("chain_1.treelist"), Some(".treelist"));
        assert_eq!(f.manager.matching_extension("chain_1.trace"), Some(".trace"));
        assert_eq!(f.manager.matching_extension("bpcomp.con.tre"), None);
        assert_eq!(f.manager.matching_extension("input.phy"), None);
    }
}
