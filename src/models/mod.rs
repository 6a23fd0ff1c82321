//! Data models module
//!
//! Defines core data structures:
//! - PackagingFamily: How the audited tool gets onto a target
//! - CommandOutput: Exit code and combined output of one target command
//! - CheckResult: Parsed outcome of one `check --json` invocation
//! - ScenarioOutcome: Immutable verdict of one scenario run
//! - HarnessReport: Aggregated report across scenarios

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    EXIT_CHECK_ASSERTION, EXIT_ENVIRONMENT, EXIT_HELPER_DEFECT, EXIT_INSTALL, EXIT_OK,
    EXIT_READINESS, EXIT_SCENARIO_TIMEOUT,
};

#[cfg(test)]
mod tests;

/// Packaging family of a target machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingFamily {
    /// Debian and Ubuntu: `.deb` via dpkg/apt
    Deb,
    /// Fedora and friends: `.rpm` via dnf/rpm
    Rpm,
    /// NixOS: tool baked into the system closure
    Nix,
    /// Any distribution installed through the hosted install script
    Script,
}

impl PackagingFamily {
    /// File extension of the local artifact, if the family uses one
    pub fn artifact_extension(&self) -> Option<&'static str> {
        match self {
            PackagingFamily::Deb => Some("deb"),
            PackagingFamily::Rpm => Some("rpm"),
            PackagingFamily::Nix | PackagingFamily::Script => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackagingFamily::Deb => "deb",
            PackagingFamily::Rpm => "rpm",
            PackagingFamily::Nix => "nix",
            PackagingFamily::Script => "script",
        }
    }
}

impl fmt::Display for PackagingFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Privilege escalation prefix composed into commands by callers.
/// An empty prefix runs commands as the transport's login user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Escalation(String);

impl Escalation {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into().trim().to_string())
    }

    pub fn none() -> Self {
        Self(String::new())
    }

    /// Prefix `command` with the escalation, if any
    pub fn wrap(&self, command: &str) -> String {
        if self.0.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", self.0, command)
        }
    }
}

/// Exit code and combined stdout/stderr of a command run on a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A piece of diagnostic text attached to an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedLog {
    /// What produced the text (e.g. "install log", "unit status")
    pub label: String,
    pub content: String,
}

impl CapturedLog {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// Parsed outcome of a single `check` invocation.
/// The raw output is kept even when parsing succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub raw_output: String,
    /// Exit code reported by the audited tool
    pub exit_code: i32,
    /// Best-effort number of checks reported, when recognisable
    pub total_checks: Option<usize>,
    /// Occurrences of the generic failure token
    pub fail_tokens: usize,
    /// Occurrences of the helper-unavailable marker
    pub helper_failures: usize,
}

impl CheckResult {
    /// All failure signals; never smaller than any single class
    pub fn failed(&self) -> usize {
        self.fail_tokens + self.helper_failures
    }
}

/// Failure categories reported to CI, one per exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCategory {
    InstallArtifactNotFound,
    InstallFailed,
    ReadinessTimeout,
    HelperConnectivityDefect,
    CheckAssertionFailed,
    ScenarioTimeout,
    Environment,
}

impl FailureCategory {
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureCategory::InstallArtifactNotFound | FailureCategory::InstallFailed => {
                EXIT_INSTALL
            }
            FailureCategory::ReadinessTimeout => EXIT_READINESS,
            FailureCategory::CheckAssertionFailed => EXIT_CHECK_ASSERTION,
            FailureCategory::ScenarioTimeout => EXIT_SCENARIO_TIMEOUT,
            FailureCategory::HelperConnectivityDefect => EXIT_HELPER_DEFECT,
            FailureCategory::Environment => EXIT_ENVIRONMENT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::InstallArtifactNotFound => "InstallArtifactNotFound",
            FailureCategory::InstallFailed => "InstallFailed",
            FailureCategory::ReadinessTimeout => "ReadinessTimeout",
            FailureCategory::HelperConnectivityDefect => "HelperConnectivityDefect",
            FailureCategory::CheckAssertionFailed => "CheckAssertionFailed",
            FailureCategory::ScenarioTimeout => "ScenarioTimeout",
            FailureCategory::Environment => "Environment",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Final verdict of a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail {
        category: FailureCategory,
        message: String,
    },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail { category, .. } => Some(*category),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category().map_or(EXIT_OK, |c| c.exit_code())
    }
}

/// Result of one scenario run. Built once by the runner, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    scenario: String,
    run_id: String,
    family: PackagingFamily,
    verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<CheckResult>,
    logs: Vec<CapturedLog>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
}

impl ScenarioOutcome {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenario: String,
        run_id: String,
        family: PackagingFamily,
        verdict: Verdict,
        check: Option<CheckResult>,
        logs: Vec<CapturedLog>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            scenario,
            run_id,
            family,
            verdict,
            check,
            logs,
            started_at,
            duration_ms,
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn family(&self) -> PackagingFamily {
        self.family
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn check(&self) -> Option<&CheckResult> {
        self.check.as_ref()
    }

    pub fn logs(&self) -> &[CapturedLog] {
        &self.logs
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// Summary statistics across all scenarios in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// Whether the run was interrupted by user signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

/// Complete output structure for JSON serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessReport {
    pub scenarios: Vec<ScenarioOutcome>,
    pub summary: RunSummary,
}

impl HarnessReport {
    pub fn new(scenarios: Vec<ScenarioOutcome>, duration_ms: u64, interrupted: bool) -> Self {
        let passed = scenarios.iter().filter(|s| s.passed()).count();
        let summary = RunSummary {
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            duration_ms,
            interrupted: if interrupted { Some(true) } else { None },
        };
        Self { scenarios, summary }
    }

    /// Exit code of the first failing scenario, in configuration order
    pub fn exit_code(&self) -> i32 {
        self.scenarios
            .iter()
            .find_map(|s| s.verdict().category())
            .map_or(EXIT_OK, |c| c.exit_code())
    }
}
