//! Outcome and verdict color mapping for CLI output.
//!
//! `console` disables styling when stdout is not a terminal or `NO_COLOR` is set.

use console::{style, StyledObject};

use crate::domain::models::{Outcome, Verdict};

/// Green for converged, yellow for the generation limit, red for failures.
pub fn colorize_outcome(outcome: Outcome) -> StyledObject<&'static str> {
    let text = outcome.as_str();
    match outcome {
        Outcome::Converged => style(text).green().bold(),
        Outcome::NotConverged => style(text).yellow(),
        Outcome::TerminatedByError => style(text).red().bold(),
    }
}

pub fn colorize_verdict(verdict: Verdict) -> StyledObject<String> {
    let text = verdict.to_string();
    match verdict {
        Verdict::BelowMinimumCycles => style(text).dim(),
        Verdict::Continue => style(text).blue(),
        Verdict::Stop { converged: true } => style(text).green().bold(),
        Verdict::Stop { converged: false } => style(text).yellow(),
    }
}
