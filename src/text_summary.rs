//! Text summary builder for the end of each stage.
//!
//! Formats the stage reports into human-readable lines.

use crate::generator::GenerationReport;
use crate::orchestrator::{AggregateReport, RunReport, TargetOutcome};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_generation_summary(report: &GenerationReport) -> TextSummary {
    TextSummary {
        lines: vec![format!(
            "Generated {} configuration files",
            report.written.len()
        )],
    }
}

pub(crate) fn build_run_summary(report: &RunReport) -> TextSummary {
    let mut lines = vec![format!(
        "Runs: {} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    )];
    for path in &report.failed {
        lines.push(format!("  failed: {}", path.display()));
    }
    TextSummary { lines }
}

pub(crate) fn build_aggregate_summary(report: &AggregateReport) -> TextSummary {
    let mut lines = Vec::new();
    if report.warmup_failures > 0 {
        lines.push(format!("Warmup: {} runs failed", report.warmup_failures));
    }
    for target in &report.targets {
        lines.push(target_line(target));
    }
    let written = report
        .targets
        .iter()
        .filter(|t| t.combined.is_some())
        .count();
    lines.push(format!(
        "Aggregated {written} of {} configurations",
        report.targets.len()
    ));
    TextSummary { lines }
}

fn target_line(target: &TargetOutcome) -> String {
    let name = target
        .config
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.config.display().to_string());
    let mut line = format!(
        "{name}: {} collected, {} failed",
        target.succeeded, target.failed
    );
    if target.missing > 0 {
        line.push_str(&format!(", {} missing results", target.missing));
    }
    match target.combined.as_deref() {
        Some(path) => line.push_str(&format!(" -> {}", path.display())),
        None => line.push_str(" (skipped)"),
    }
    line
}
