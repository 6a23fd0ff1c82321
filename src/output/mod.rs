//! Output formatting module
//!
//! Handles:
//! - Human-readable run reports, one line per scenario plus failure detail
//! - JSON run reports
//! - Scenario listings and offline check counts

use anyhow::Result;
use std::fmt::Write;

use crate::models::{CheckResult, HarnessReport, ScenarioOutcome, Verdict};
use crate::scenario::ScenarioPlan;

/// Lines of each captured log shown in human output
const LOG_TAIL_LINES: usize = 20;

fn format_duration(duration_ms: u64) -> String {
    let duration_sec = duration_ms as f64 / 1000.0;
    if duration_sec < 1.0 {
        format!("{}ms", duration_ms)
    } else {
        format!("{:.2}s", duration_sec)
    }
}

fn tail(content: &str, lines: usize) -> Vec<&str> {
    let all: Vec<&str> = content.lines().collect();
    let skip = all.len().saturating_sub(lines);
    all[skip..].to_vec()
}

fn render_outcome(out: &mut String, outcome: &ScenarioOutcome) {
    let status = match outcome.verdict() {
        Verdict::Pass => "PASS".to_string(),
        Verdict::Fail { category, .. } => format!("FAIL {}", category),
    };
    let _ = writeln!(
        out,
        "{:<6} {:<24} {:<7} {}",
        if outcome.passed() { "ok" } else { "FAILED" },
        outcome.scenario(),
        outcome.family(),
        status
    );

    if let Some(check) = outcome.check() {
        let total = check
            .total_checks
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        let _ = writeln!(
            out,
            "         checks: {}, fail: {}, helper unavailable: {}",
            total, check.fail_tokens, check.helper_failures
        );
    }

    if let Verdict::Fail { message, .. } = outcome.verdict() {
        let _ = writeln!(out, "         {}", message);
        for log in outcome.logs() {
            if log.content.trim().is_empty() {
                continue;
            }
            let _ = writeln!(out, "         --- {} ---", log.label);
            for line in tail(&log.content, LOG_TAIL_LINES) {
                let _ = writeln!(out, "         {}", line);
            }
        }
        if let Some(check) = outcome.check() {
            let _ = writeln!(out, "         --- check output ---");
            for line in tail(&check.raw_output, LOG_TAIL_LINES) {
                let _ = writeln!(out, "         {}", line);
            }
        }
    }
}

/// Human-readable report text
pub fn render_human(report: &HarnessReport) -> String {
    let mut out = String::new();
    if report.scenarios.is_empty() {
        out.push_str("No scenarios were run.\n");
    }
    for outcome in &report.scenarios {
        render_outcome(&mut out, outcome);
    }

    let summary = &report.summary;
    out.push('\n');
    out.push_str("Run Summary:\n");
    let _ = writeln!(out, "  Scenarios: {}", summary.total);
    let _ = writeln!(out, "  Passed: {}", summary.passed);
    let _ = writeln!(out, "  Failed: {}", summary.failed);
    let _ = writeln!(out, "  Duration: {}", format_duration(summary.duration_ms));
    if let Some(true) = summary.interrupted {
        out.push_str("  Status: Interrupted by user\n");
    }
    out
}

/// Print the report in human-readable format
pub fn format_human(report: &HarnessReport) -> Result<()> {
    print!("{}", render_human(report));
    Ok(())
}

/// Print the report as pretty JSON
pub fn format_json(report: &HarnessReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// One line per configured scenario
pub fn render_plans(plans: &[ScenarioPlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        let _ = writeln!(
            out,
            "{:<24} {:<7} {:<14} expect {} fail(s)",
            plan.name, plan.family, plan.install.strategy, plan.policy.expected_failures
        );
    }
    out
}

/// Counts from a saved check output
pub fn render_count(result: &CheckResult) -> String {
    let mut out = String::new();
    if let Some(total) = result.total_checks {
        let _ = writeln!(out, "checks: {}", total);
    }
    let _ = writeln!(out, "fail: {}", result.fail_tokens);
    let _ = writeln!(out, "helper unavailable: {}", result.helper_failures);
    out
}
