//! Unit tests for data models module
//!
//! Covers exit-code mapping, report aggregation and JSON shape.

use super::*;

fn outcome(name: &str, verdict: Verdict) -> ScenarioOutcome {
    ScenarioOutcome::new(
        name.to_string(),
        "3f2c".to_string(),
        PackagingFamily::Rpm,
        verdict,
        None,
        Vec::new(),
        Utc::now(),
        42,
    )
}

fn fail(category: FailureCategory) -> Verdict {
    Verdict::Fail {
        category,
        message: "boom".to_string(),
    }
}

#[test]
fn test_category_exit_codes() {
    assert_eq!(FailureCategory::InstallArtifactNotFound.exit_code(), 1);
    assert_eq!(FailureCategory::InstallFailed.exit_code(), 1);
    assert_eq!(FailureCategory::ReadinessTimeout.exit_code(), 2);
    assert_eq!(FailureCategory::CheckAssertionFailed.exit_code(), 3);
    assert_eq!(FailureCategory::ScenarioTimeout.exit_code(), 4);
    assert_eq!(FailureCategory::HelperConnectivityDefect.exit_code(), 5);
    assert_eq!(FailureCategory::Environment.exit_code(), 6);
    assert_eq!(Verdict::Pass.exit_code(), 0);
}

#[test]
fn test_report_exit_code_follows_first_failure() {
    let report = HarnessReport::new(
        vec![
            outcome("debian", Verdict::Pass),
            outcome("fedora", fail(FailureCategory::ReadinessTimeout)),
            outcome("ubuntu", fail(FailureCategory::InstallFailed)),
        ],
        100,
        false,
    );
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.failed, 2);
    assert_eq!(report.summary.interrupted, None);
}

#[test]
fn test_all_pass_exits_zero() {
    let report = HarnessReport::new(vec![outcome("nixos", Verdict::Pass)], 5, false);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_verdict_json_is_tagged() {
    let value = serde_json::to_value(fail(FailureCategory::HelperConnectivityDefect)).unwrap();
    assert_eq!(value["status"], "fail");
    assert_eq!(value["category"], "HelperConnectivityDefect");
    assert_eq!(serde_json::to_value(Verdict::Pass).unwrap()["status"], "pass");
}

#[test]
fn test_outcome_omits_missing_check() {
    let value = serde_json::to_value(outcome("debian", Verdict::Pass)).unwrap();
    assert!(value.get("check").is_none());
    assert_eq!(value["family"], "rpm");
    assert_eq!(value["duration_ms"], 42);
}

#[test]
fn test_escalation_wrap() {
    assert_eq!(Escalation::new("sudo ").wrap("dnf install -y x.rpm"), "sudo dnf install -y x.rpm");
    assert_eq!(Escalation::none().wrap("id -u"), "id -u");
}

#[test]
fn test_family_parses_lowercase() {
    let family: PackagingFamily = serde_json::from_str("\"script\"").unwrap();
    assert_eq!(family, PackagingFamily::Script);
    assert_eq!(PackagingFamily::Deb.artifact_extension(), Some("deb"));
    assert_eq!(PackagingFamily::Nix.artifact_extension(), None);
}
