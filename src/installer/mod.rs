//! Installer strategy registry
//!
//! Responsible for:
//! - Selecting one install strategy per packaging family
//! - Locating the architecture-qualified artifact in the staging area
//! - Running the install with non-interactive package-manager settings
//! - Capturing the installer's own exit code and log
//! - Retrying a failed remote-script fetch exactly once

pub mod capture;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;
use crate::error::{HarnessError, InstallFailure, Result};
use crate::logging::HarnessLogger;
use crate::models::{Escalation, PackagingFamily};
use crate::target::{shell_quote, Target, Transport};

use capture::CapturedRun;

/// Remote fetches get one retry; every other install step gets none
const REMOTE_FETCH_ATTEMPTS: u32 = 2;

const NONINTERACTIVE_ENV: &str = "env DEBIAN_FRONTEND=noninteractive";

/// Closed set of install procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStrategy {
    /// `dpkg -i <artifact>`
    Dpkg,
    /// `apt-get install -y <artifact>`, resolving dependencies in one step
    Apt,
    /// `dpkg -i` to unpack, then `apt-get install -f` to pull dependencies
    DpkgThenApt,
    /// `dnf install -y <artifact>`
    Dnf,
    /// `rpm -Uvh <artifact>`
    Rpm,
    /// Fetch and run the hosted install script
    RemoteScript,
    /// Tool is part of the system image, nothing to install
    Preinstalled,
}

impl InstallStrategy {
    pub fn default_for(family: PackagingFamily) -> Self {
        match family {
            PackagingFamily::Deb => InstallStrategy::Dpkg,
            PackagingFamily::Rpm => InstallStrategy::Dnf,
            PackagingFamily::Nix => InstallStrategy::Preinstalled,
            PackagingFamily::Script => InstallStrategy::RemoteScript,
        }
    }

    pub fn supports(&self, family: PackagingFamily) -> bool {
        match self {
            InstallStrategy::Dpkg | InstallStrategy::Apt | InstallStrategy::DpkgThenApt => {
                family == PackagingFamily::Deb
            }
            InstallStrategy::Dnf | InstallStrategy::Rpm => family == PackagingFamily::Rpm,
            InstallStrategy::RemoteScript => family == PackagingFamily::Script,
            InstallStrategy::Preinstalled => family == PackagingFamily::Nix,
        }
    }

    /// Commands installing `artifact`; empty for strategies without one
    pub fn steps(&self, artifact: &str, escalation: &Escalation) -> Vec<InstallStep> {
        let artifact = shell_quote(artifact);
        match self {
            InstallStrategy::Dpkg => vec![InstallStep::required(
                escalation.wrap(&format!("{} dpkg -i {}", NONINTERACTIVE_ENV, artifact)),
            )],
            InstallStrategy::Apt => vec![InstallStep::required(escalation.wrap(&format!(
                "{} apt-get install -y {}",
                NONINTERACTIVE_ENV, artifact
            )))],
            InstallStrategy::DpkgThenApt => vec![
                InstallStep::tolerated(
                    escalation.wrap(&format!("{} dpkg -i {}", NONINTERACTIVE_ENV, artifact)),
                ),
                InstallStep::required(
                    escalation.wrap(&format!("{} apt-get install -f -y", NONINTERACTIVE_ENV)),
                ),
            ],
            InstallStrategy::Dnf => vec![InstallStep::required(
                escalation.wrap(&format!("dnf install -y {}", artifact)),
            )],
            InstallStrategy::Rpm => vec![InstallStep::required(
                escalation.wrap(&format!("rpm -Uvh {}", artifact)),
            )],
            InstallStrategy::RemoteScript | InstallStrategy::Preinstalled => Vec::new(),
        }
    }
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStrategy::Dpkg => "dpkg",
            InstallStrategy::Apt => "apt",
            InstallStrategy::DpkgThenApt => "dpkg-then-apt",
            InstallStrategy::Dnf => "dnf",
            InstallStrategy::Rpm => "rpm",
            InstallStrategy::RemoteScript => "remote-script",
            InstallStrategy::Preinstalled => "preinstalled",
        };
        f.pad(name)
    }
}

/// One shell command of a local-artifact install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub command: String,
    /// A failing tolerated step does not stop the install; a later step
    /// is expected to repair what it left behind
    pub tolerate_failure: bool,
}

impl InstallStep {
    fn required(command: String) -> Self {
        Self {
            command,
            tolerate_failure: false,
        }
    }

    fn tolerated(command: String) -> Self {
        Self {
            command,
            tolerate_failure: true,
        }
    }
}

/// Join steps into one script that stops at the first required failure
pub fn inner_script(steps: &[InstallStep]) -> String {
    let mut script = String::from("set -e\n");
    for (index, step) in steps.iter().enumerate() {
        if step.tolerate_failure {
            script.push_str(&format!(
                "{} || echo \"pkgsmoke: step {} exited $?, continuing\"\n",
                step.command,
                index + 1
            ));
        } else {
            script.push_str(&step.command);
            script.push('\n');
        }
    }
    script
}

/// Where the tool comes from
#[derive(Debug, Clone, PartialEq)]
pub enum InstallSource {
    LocalArtifact { staging_dir: String, pattern: Pattern },
    RemoteScript { url: String },
    Preinstalled,
}

/// What a successful install leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedArtifacts {
    /// Socket unit of the privileged helper, if the family ships one
    pub helper_unit: Option<String>,
    pub binary: String,
}

/// The single install procedure selected for a target
#[derive(Debug, Clone, PartialEq)]
pub struct InstallSpec {
    pub strategy: InstallStrategy,
    pub source: InstallSource,
    pub expected: ExpectedArtifacts,
    /// Shell commands run after the install, `{log}` expands to the log path
    pub post_install: Vec<String>,
    /// Substrings the install log must contain
    pub expect_log_contains: Vec<String>,
}

/// Per-scenario `[scenario.install]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallOverrides {
    #[serde(default)]
    pub strategy: Option<InstallStrategy>,
    #[serde(default)]
    pub staging_dir: Option<String>,
    /// Glob matched against file names in the staging dir
    #[serde(default)]
    pub artifact_pattern: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub expect_log_contains: Vec<String>,
}

/// Maps packaging families to install specs
#[derive(Debug, Clone)]
pub struct InstallerRegistry {
    staging_dir: String,
    install_url: String,
    helper_unit: String,
}

impl InstallerRegistry {
    pub fn new(
        staging_dir: impl Into<String>,
        install_url: impl Into<String>,
        helper_unit: impl Into<String>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            install_url: install_url.into(),
            helper_unit: helper_unit.into(),
        }
    }

    /// Resolve the strategy for `family`, rejecting incompatible overrides
    pub fn strategy_for(
        &self,
        family: PackagingFamily,
        requested: Option<InstallStrategy>,
    ) -> std::result::Result<InstallStrategy, ConfigError> {
        match requested {
            Some(strategy) if !strategy.supports(family) => {
                Err(ConfigError::IncompatibleStrategy { strategy, family })
            }
            Some(strategy) => Ok(strategy),
            None => Ok(InstallStrategy::default_for(family)),
        }
    }

    pub fn spec_for(
        &self,
        family: PackagingFamily,
        arch: &str,
        binary: &str,
        overrides: &InstallOverrides,
    ) -> std::result::Result<InstallSpec, ConfigError> {
        let strategy = self.strategy_for(family, overrides.strategy)?;

        let source = match strategy {
            InstallStrategy::RemoteScript => InstallSource::RemoteScript {
                url: overrides
                    .url
                    .clone()
                    .unwrap_or_else(|| self.install_url.clone()),
            },
            InstallStrategy::Preinstalled => InstallSource::Preinstalled,
            _ => {
                let raw = match &overrides.artifact_pattern {
                    Some(pattern) => pattern.clone(),
                    None => default_artifact_pattern(family, arch),
                };
                let pattern = Pattern::new(&raw).map_err(|e| ConfigError::InvalidPattern {
                    pattern: raw.clone(),
                    reason: e.to_string(),
                })?;
                InstallSource::LocalArtifact {
                    staging_dir: overrides
                        .staging_dir
                        .clone()
                        .unwrap_or_else(|| self.staging_dir.clone()),
                    pattern,
                }
            }
        };

        let helper_unit = match family {
            PackagingFamily::Nix => None,
            _ => Some(self.helper_unit.clone()),
        };

        Ok(InstallSpec {
            strategy,
            source,
            expected: ExpectedArtifacts {
                helper_unit,
                binary: binary.to_string(),
            },
            post_install: overrides.post_install.clone(),
            expect_log_contains: overrides.expect_log_contains.clone(),
        })
    }
}

fn default_artifact_pattern(family: PackagingFamily, arch: &str) -> String {
    match family.artifact_extension() {
        Some(ext) => format!("*_{}.{}", arch, ext),
        None => format!("*_{}.*", arch),
    }
}

/// Runtime knobs for one install
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub run_id: String,
    pub retry_backoff: Duration,
}

impl InstallOptions {
    fn log_path(&self) -> String {
        format!("/tmp/pkgsmoke-{}-install.log", self.run_id)
    }

    fn fetch_log_path(&self) -> String {
        format!("/tmp/pkgsmoke-{}-fetch.log", self.run_id)
    }

    fn script_path(&self) -> String {
        format!("/tmp/pkgsmoke-{}-install.sh", self.run_id)
    }
}

/// What an install did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub artifact: Option<String>,
    /// Exit code of the installer itself, `None` when nothing was run
    pub exit_code: Option<i32>,
    pub attempts: u32,
    pub log: String,
}

/// Find the one file in `staging_dir` whose name matches `pattern`
pub async fn locate_artifact<T: Transport>(
    target: &Target<T>,
    staging_dir: &str,
    pattern: &Pattern,
) -> Result<String> {
    let listing = target
        .execute(&format!("ls -1 {}", shell_quote(staging_dir)))
        .await?;

    if !listing.success() {
        return Err(HarnessError::InstallArtifactNotFound {
            staging_dir: staging_dir.to_string(),
            pattern: pattern.as_str().to_string(),
            listing: listing.output,
        });
    }

    let matches: Vec<&str> = listing
        .output
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && pattern.matches(name))
        .collect();

    match matches.as_slice() {
        [] => Err(HarnessError::InstallArtifactNotFound {
            staging_dir: staging_dir.to_string(),
            pattern: pattern.as_str().to_string(),
            listing: listing.output.clone(),
        }),
        [name] => Ok(format!("{}/{}", staging_dir.trim_end_matches('/'), name)),
        _ => Err(HarnessError::AmbiguousArtifact {
            staging_dir: staging_dir.to_string(),
            pattern: pattern.as_str().to_string(),
            matches: matches.iter().map(|m| m.to_string()).collect(),
        }),
    }
}

async fn run_captured<T: Transport>(
    target: &Target<T>,
    inner: &str,
    log_path: &str,
    post_stages: &[String],
) -> Result<CapturedRun> {
    let out = target
        .execute(&capture::wrap(inner, log_path, post_stages))
        .await?;
    Ok(capture::parse(&out.output))
}

fn finish(run: CapturedRun, attempts: u32, artifact: Option<String>) -> Result<InstallReport> {
    match run.exit_code {
        Some(0) => Ok(InstallReport {
            artifact,
            exit_code: Some(0),
            attempts,
            log: run.output,
        }),
        Some(code) => Err(HarnessError::InstallFailed {
            reason: InstallFailure::ExitStatus(code),
            attempts,
            log: run.output,
        }),
        None => Err(HarnessError::InstallFailed {
            reason: InstallFailure::MissingExitCode,
            attempts,
            log: run.output,
        }),
    }
}

fn check_log(spec: &InstallSpec, report: InstallReport) -> Result<InstallReport> {
    if let Some(missing) = spec
        .expect_log_contains
        .iter()
        .find(|needle| !report.log.contains(needle.as_str()))
    {
        return Err(HarnessError::InstallFailed {
            reason: InstallFailure::LogAssertion(missing.clone()),
            attempts: report.attempts,
            log: report.log,
        });
    }
    Ok(report)
}

/// Install the audited tool on `target` according to `spec`
pub async fn install<T: Transport>(
    target: &Target<T>,
    spec: &InstallSpec,
    escalation: &Escalation,
    options: &InstallOptions,
    logger: &HarnessLogger,
) -> Result<InstallReport> {
    let report = match &spec.source {
        InstallSource::LocalArtifact {
            staging_dir,
            pattern,
        } => {
            let artifact = locate_artifact(target, staging_dir, pattern).await?;
            let steps = spec.strategy.steps(&artifact, escalation);
            let run = run_captured(
                target,
                &inner_script(&steps),
                &options.log_path(),
                &spec.post_install,
            )
            .await?;
            finish(run, 1, Some(artifact))?
        }
        InstallSource::RemoteScript { url } => {
            install_remote(target, url, spec, escalation, options, logger).await?
        }
        InstallSource::Preinstalled => InstallReport {
            artifact: None,
            exit_code: None,
            attempts: 0,
            log: format!("{} is provided by the system image", spec.expected.binary),
        },
    };

    check_log(spec, report)
}

async fn install_remote<T: Transport>(
    target: &Target<T>,
    url: &str,
    spec: &InstallSpec,
    escalation: &Escalation,
    options: &InstallOptions,
    logger: &HarnessLogger,
) -> Result<InstallReport> {
    let script_path = shell_quote(&options.script_path());
    let fetch = format!(
        "curl -fsSL --connect-timeout 30 -o {} {}",
        script_path,
        shell_quote(url)
    );

    let mut attempts = 0;
    loop {
        attempts += 1;
        let run = run_captured(target, &fetch, &options.fetch_log_path(), &[]).await?;
        match run.exit_code {
            Some(0) => break,
            Some(code) if attempts < REMOTE_FETCH_ATTEMPTS => {
                logger.install_retry(
                    attempts,
                    options.retry_backoff,
                    &InstallFailure::Network { exit_code: code }.to_string(),
                );
                tokio::time::sleep(options.retry_backoff).await;
            }
            Some(code) => {
                return Err(HarnessError::InstallFailed {
                    reason: InstallFailure::Network { exit_code: code },
                    attempts,
                    log: run.output,
                })
            }
            None => {
                return Err(HarnessError::InstallFailed {
                    reason: InstallFailure::MissingExitCode,
                    attempts,
                    log: run.output,
                })
            }
        }
    }

    let inner = escalation.wrap(&format!("bash {}", script_path));
    let run = run_captured(target, &inner, &options.log_path(), &spec.post_install).await?;
    finish(run, attempts, None)
}
