//! Result rendering

use console::style;
use std::fmt::Write as _;
use std::time::Duration;
use webapi_tests::{CaseOutcome, RunSummary};

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// One line per case
#[must_use]
pub fn render_outcome(outcome: &CaseOutcome) -> String {
    let elapsed = format_duration(outcome.elapsed);
    match &outcome.error {
        None => format!("{} {} ({elapsed})", style("PASS").green().bold(), outcome.name),
        Some(error) => format!(
            "{} {} ({elapsed})\n     {}",
            style("FAIL").red().bold(),
            outcome.name,
            style(error).red()
        ),
    }
}

/// Every case followed by a totals line
#[must_use]
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    for outcome in &summary.outcomes {
        let _ = writeln!(out, "{}", render_outcome(outcome));
    }

    let totals = format!(
        "{} passed, {} failed, {} total in {}",
        summary.passed_count(),
        summary.failed_count(),
        summary.total(),
        format_duration(summary.elapsed)
    );
    let totals = if summary.all_passed() {
        style(totals).green()
    } else {
        style(totals).red()
    };
    let _ = writeln!(out, "\n{totals}");
    out
}
