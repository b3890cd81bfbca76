//! Implementation of the `phylomatic run` command.

use anyhow::Result;
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{load_config, ConfigOverrides};
use crate::cli::display::{colorize_outcome, colorize_verdict, list_table, render_list};
use crate::cli::output::{format_stat, output, CommandOutput};
use crate::domain::models::PipelineEvent;
use crate::infrastructure::logging::LoggerImpl;
use crate::services::input_discovery::discover;
use crate::services::{AlignmentPipeline, ExternalStatisticsProbe, PipelineReport};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Alignment files, or directories containing alignments
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub report: PipelineReport,
    pub run_log: PathBuf,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&[
            "alignment",
            "outcome",
            "cycles",
            "generations",
            "effsize",
            "rel diff",
            "max diff",
        ]);
        for result in &self.report.results {
            let generations: Vec<String> = result
                .row
                .generations
                .iter()
                .map(ToString::to_string)
                .collect();
            table.add_row(vec![
                result.alignment.clone(),
                colorize_outcome(result.outcome).to_string(),
                result.cycles.to_string(),
                generations.join(" "),
                result.row.statistics.effsize.to_string(),
                format_stat(result.row.statistics.loglik_rel_diff),
                format_stat(result.row.statistics.max_diff),
            ]);
        }

        format!(
            "{}\n\nRun log: {}",
            render_list("alignment", &table, self.report.results.len()),
            self.run_log.display()
        )
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path, &args.overrides)?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let alignments = discover(&args.paths, &config.input.filetypes).await?;
    let run_log = config.output.run_log_path();

    let probe = Arc::new(ExternalStatisticsProbe::new(
        config.tools.clone(),
        config.output.clone(),
    ));

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event, json_mode);
        }
    });

    let pipeline = AlignmentPipeline::new(config, probe).with_events(event_tx);
    let result = pipeline.run(&alignments).await;

    // Dropping the pipeline closes the channel so the printer drains and exits.
    drop(pipeline);
    let _ = printer.await;

    let report = result?;
    output(&RunOutput { report, run_log }, json_mode);
    Ok(())
}

fn print_event(event: &PipelineEvent, json_mode: bool) {
    if json_mode {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        PipelineEvent::AlignmentStarted {
            alignment,
            index,
            total,
        } => {
            println!(
                "{} {}",
                style(format!("[{}/{total}]", index + 1)).dim(),
                style(alignment).bold()
            );
        }
        PipelineEvent::ChainsLaunched {
            chains,
            threads_per_chain,
            ..
        } => {
            println!(
                "  launched {} ({threads_per_chain} threads each)",
                chains.join(", ")
            );
        }
        PipelineEvent::CycleCompleted {
            cycle,
            snapshot,
            verdict,
            ..
        } => {
            let generations: Vec<String> = snapshot
                .generation_values()
                .iter()
                .map(ToString::to_string)
                .collect();
            let statistics = snapshot.statistics.map_or_else(String::new, |s| {
                format!(
                    " | effsize {} rel_diff {} max_diff {}",
                    s.effsize,
                    format_stat(s.loglik_rel_diff),
                    format_stat(s.max_diff)
                )
            });
            println!(
                "  cycle {cycle}: generations {}{statistics} -> {}",
                generations.join(" "),
                colorize_verdict(*verdict)
            );
        }
        PipelineEvent::AlignmentFinished {
            alignment, outcome, ..
        } => {
            println!("  {alignment}: {}", colorize_outcome(*outcome));
        }
        PipelineEvent::AlignmentFailed { alignment, error } => {
            println!("  {alignment}: {} {error}", style("failed").red().bold());
        }
        PipelineEvent::PipelineFinished { processed, .. } => {
            println!("\nProcessed {processed} alignment(s)\n");
        }
    }
}
