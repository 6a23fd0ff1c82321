//! Error taxonomy for scenario runs
//!
//! Every variant maps to exactly one [`FailureCategory`] and carries the
//! diagnostics needed to explain it without re-running the scenario.

use std::fmt;
use std::time::Duration;

use crate::models::{CapturedLog, FailureCategory};

/// Why an install attempt was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallFailure {
    /// Fetching the remote install script failed
    Network { exit_code: i32 },
    /// The installer exited non-zero
    ExitStatus(i32),
    /// The capture wrapper never reported an exit code
    MissingExitCode,
    /// The installer log lacks an expected line
    LogAssertion(String),
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallFailure::Network { exit_code } => {
                write!(f, "network: fetch exited with {}", exit_code)
            }
            InstallFailure::ExitStatus(code) => write!(f, "installer exited with {}", code),
            InstallFailure::MissingExitCode => f.write_str("installer exit code was not captured"),
            InstallFailure::LogAssertion(needle) => {
                write!(f, "install log does not contain `{}`", needle)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("no artifact matching `{pattern}` in {staging_dir}")]
    InstallArtifactNotFound {
        staging_dir: String,
        pattern: String,
        listing: String,
    },

    #[error("{} artifacts match `{pattern}` in {staging_dir}, expected exactly one", .matches.len())]
    AmbiguousArtifact {
        staging_dir: String,
        pattern: String,
        matches: Vec<String>,
    },

    #[error("install failed ({reason}) after {attempts} attempt(s)")]
    InstallFailed {
        reason: InstallFailure,
        attempts: u32,
        log: String,
    },

    #[error("{condition} not ready after {}s", .waited.as_secs())]
    ReadinessTimeout {
        condition: String,
        waited: Duration,
        diagnostics: Vec<CapturedLog>,
    },

    #[error("helper connectivity defect: `{marker}` reported {occurrences} time(s)")]
    HelperConnectivityDefect {
        marker: String,
        occurrences: usize,
        raw_output: String,
    },

    #[error("found {actual} failed checks, expected {expected}")]
    CheckAssertionFailed {
        expected: usize,
        actual: usize,
        raw_output: String,
    },

    #[error("scenario did not finish within {}s", .0.as_secs())]
    ScenarioTimeout(Duration),

    #[error("command `{command}` exited with {exit_code}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("command `{command}` did not finish within {}s", .timeout.as_secs())]
    CommandTimeout { command: String, timeout: Duration },

    #[error("failed to run `{command}` on target")]
    Transport {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub fn category(&self) -> FailureCategory {
        match self {
            HarnessError::InstallArtifactNotFound { .. } | HarnessError::AmbiguousArtifact { .. } => {
                FailureCategory::InstallArtifactNotFound
            }
            HarnessError::InstallFailed { .. } => FailureCategory::InstallFailed,
            HarnessError::ReadinessTimeout { .. } => FailureCategory::ReadinessTimeout,
            HarnessError::HelperConnectivityDefect { .. } => {
                FailureCategory::HelperConnectivityDefect
            }
            HarnessError::CheckAssertionFailed { .. } => FailureCategory::CheckAssertionFailed,
            HarnessError::ScenarioTimeout(_) => FailureCategory::ScenarioTimeout,
            HarnessError::CommandFailed { .. }
            | HarnessError::CommandTimeout { .. }
            | HarnessError::Transport { .. } => FailureCategory::Environment,
        }
    }

    /// Logs carried by the error, for the scenario report
    pub fn diagnostics(&self) -> Vec<CapturedLog> {
        match self {
            HarnessError::InstallArtifactNotFound { listing, .. } => {
                vec![CapturedLog::new("staging listing", listing.clone())]
            }
            HarnessError::AmbiguousArtifact { matches, .. } => {
                vec![CapturedLog::new("matching artifacts", matches.join("\n"))]
            }
            HarnessError::InstallFailed { log, .. } => {
                vec![CapturedLog::new("install log", log.clone())]
            }
            HarnessError::ReadinessTimeout { diagnostics, .. } => diagnostics.clone(),
            HarnessError::HelperConnectivityDefect { raw_output, .. }
            | HarnessError::CheckAssertionFailed { raw_output, .. } => {
                vec![CapturedLog::new("check output", raw_output.clone())]
            }
            HarnessError::CommandFailed { output, .. } => {
                vec![CapturedLog::new("command output", output.clone())]
            }
            HarnessError::Transport { source, .. } => {
                vec![CapturedLog::new("transport error", source.to_string())]
            }
            HarnessError::ScenarioTimeout(_) | HarnessError::CommandTimeout { .. } => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
