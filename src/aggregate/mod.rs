//! Result aggregation
//!
//! Turns raw check output into a [`CheckResult`] and judges it against the
//! scenario's [`FailurePolicy`].

use regex::Regex;
use std::sync::OnceLock;

use crate::constants::{FAIL_TOKEN, HELPER_UNAVAILABLE_MARKER};
use crate::error::{HarnessError, Result};
use crate::models::{CheckResult, CommandOutput};

/// Parses check output. Implementations must be pure: the same output always
/// yields the same result.
pub trait ResultParser: Send + Sync {
    fn parse(&self, output: &CommandOutput) -> CheckResult;
}

/// Counts literal, case-sensitive substring occurrences
#[derive(Debug, Clone)]
pub struct SubstringParser {
    fail_token: String,
    helper_marker: String,
}

impl Default for SubstringParser {
    fn default() -> Self {
        Self::new(FAIL_TOKEN, HELPER_UNAVAILABLE_MARKER)
    }
}

impl SubstringParser {
    pub fn new(fail_token: impl Into<String>, helper_marker: impl Into<String>) -> Self {
        Self {
            fail_token: fail_token.into(),
            helper_marker: helper_marker.into(),
        }
    }
}

fn entry_regex() -> &'static Regex {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    ENTRY.get_or_init(|| Regex::new(r#"(?m)^\s*"[^"]+"\s*:\s*""#).expect("literal regex"))
}

impl ResultParser for SubstringParser {
    fn parse(&self, output: &CommandOutput) -> CheckResult {
        let raw = &output.output;
        let entries = entry_regex().find_iter(raw).count();
        CheckResult {
            raw_output: raw.clone(),
            exit_code: output.exit_code,
            total_checks: (entries > 0).then_some(entries),
            fail_tokens: raw.matches(self.fail_token.as_str()).count(),
            helper_failures: raw.matches(self.helper_marker.as_str()).count(),
        }
    }
}

/// How many failures a scenario expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailurePolicy {
    pub expected_failures: usize,
}

impl FailurePolicy {
    pub fn new(expected_failures: usize) -> Self {
        Self { expected_failures }
    }

    /// A helper marker fails the scenario whatever the fail count says
    pub fn evaluate(&self, result: &CheckResult) -> Result<()> {
        if result.helper_failures > 0 {
            return Err(HarnessError::HelperConnectivityDefect {
                marker: HELPER_UNAVAILABLE_MARKER.to_string(),
                occurrences: result.helper_failures,
                raw_output: result.raw_output.clone(),
            });
        }
        if result.fail_tokens != self.expected_failures {
            return Err(HarnessError::CheckAssertionFailed {
                expected: self.expected_failures,
                actual: result.fail_tokens,
                raw_output: result.raw_output.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureCategory;

    fn output(text: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            output: text.to_string(),
        }
    }

    const CLEAN: &str = r#"{
  "2e46c89a-5461-4865-a92e-3b799c12034a": "passed",
  "44e4754a-0b42-4964-9cc2-b88b2023cb1e": "passed",
  "7434560b-ea7c-4b5c-85a0-0b9ba9b2a4b5": "skipped"
}
"#;

    const FOUR_FAILED: &str = r#"{
  "2e46c89a-5461-4865-a92e-3b799c12034a": "failed",
  "44e4754a-0b42-4964-9cc2-b88b2023cb1e": "failed",
  "7434560b-ea7c-4b5c-85a0-0b9ba9b2a4b5": "failed",
  "e8b6d5a1-38d2-4b85-8c6c-1d3f7a6d53f2": "failed",
  "f962c423-fdf5-428a-a57a-816abc9b253e": "passed"
}
"#;

    #[test]
    fn test_counts_fail_tokens_case_sensitively() {
        let result = SubstringParser::default().parse(&output("fail FAIL Fail failed\n"));
        assert_eq!(result.fail_tokens, 2);
        assert_eq!(result.helper_failures, 0);
    }

    #[test]
    fn test_total_checks_best_effort() {
        let parser = SubstringParser::default();
        assert_eq!(parser.parse(&output(CLEAN)).total_checks, Some(3));
        assert_eq!(parser.parse(&output("not json at all")).total_checks, None);
    }

    #[test]
    fn test_parse_is_idempotent_and_keeps_raw() {
        let parser = SubstringParser::default();
        let first = parser.parse(&output(FOUR_FAILED));
        let second = parser.parse(&output(FOUR_FAILED));
        assert_eq!(first, second);
        assert_eq!(first.raw_output, FOUR_FAILED);
    }

    #[test]
    fn test_zero_failures_pass() {
        let result = SubstringParser::default().parse(&output(CLEAN));
        assert!(FailurePolicy::new(0).evaluate(&result).is_ok());
    }

    #[test]
    fn test_expected_four_failures_pass() {
        let result = SubstringParser::default().parse(&output(FOUR_FAILED));
        assert_eq!(result.fail_tokens, 4);
        assert!(FailurePolicy::new(4).evaluate(&result).is_ok());
    }

    #[test]
    fn test_count_mismatch_is_assertion_failure() {
        let result = SubstringParser::default().parse(&output(FOUR_FAILED));
        let err = FailurePolicy::new(2).evaluate(&result).unwrap_err();
        match err {
            HarnessError::CheckAssertionFailed {
                expected, actual, ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_helper_marker_wins_over_matching_count() {
        let text = "Failed to connect to helper\n{\n  \"a\": \"failed\"\n}\n";
        let result = SubstringParser::default().parse(&output(text));
        assert_eq!(result.fail_tokens, 1);
        assert_eq!(result.helper_failures, 1);

        let err = FailurePolicy::new(1).evaluate(&result).unwrap_err();
        assert_eq!(err.category(), FailureCategory::HelperConnectivityDefect);
    }

    #[test]
    fn test_failed_never_below_subclasses() {
        let text = "Failed to connect to helper\nFailed to connect to helper\nfail\n";
        let result = SubstringParser::default().parse(&output(text));
        assert!(result.failed() >= result.helper_failures);
        assert!(result.failed() >= result.fail_tokens);
        assert_eq!(result.failed(), 3);
    }
}
