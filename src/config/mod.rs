//! Scenario configuration
//!
//! Handles TOML parsing, defaulting and validation of scenario files, and
//! resolves each `[[scenario]]` into a [`ScenarioPlan`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::FailurePolicy;
use crate::check::CheckInvocation;
use crate::constants::{
    DEFAULT_BASE_UNIT, DEFAULT_ESCALATION, DEFAULT_HELPER_UNIT, DEFAULT_INSTALL_URL,
    DEFAULT_STAGING_DIR, DEFAULT_TOOL, HELPER_READY_STATE, JSON_FLAG, LOCAL_CONFIG_FILE,
    PRODUCT_BANNER,
};
use crate::installer::{ExpectedArtifacts, InstallOverrides, InstallStrategy, InstallerRegistry};
use crate::models::{Escalation, PackagingFamily};
use crate::readiness::{Backoff, ReadinessCondition};
use crate::scenario::ScenarioPlan;
use crate::target::Backend;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration declares no scenarios")]
    NoScenarios,

    #[error("Scenario name must not be empty")]
    EmptyName,

    #[error("Duplicate scenario name: {0}")]
    DuplicateScenario(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Strategy {strategy} cannot install {family} packages")]
    IncompatibleStrategy {
        strategy: InstallStrategy,
        family: PackagingFamily,
    },

    #[error("Invalid artifact pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid {field} for scenario {scenario}: must be greater than zero")]
    ZeroDuration { scenario: String, field: &'static str },

    #[error("Invalid poll interval for scenario {scenario}: initial {initial_ms}ms exceeds maximum {max_ms}ms")]
    InvalidPollInterval {
        scenario: String,
        initial_ms: u64,
        max_ms: u64,
    },

    #[error("Check arguments must request machine-readable output with {flag}")]
    MissingJsonFlag { flag: &'static str },
}

/// `[defaults]` table, every field optional
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub tool: String,
    pub arch: String,
    pub staging_dir: String,
    /// Unit marking base OS readiness, empty to skip the wait
    pub base_unit: String,
    /// Prefix for privileged commands, empty when already root
    pub escalation: String,
    pub install_url: String,
    pub helper_unit: String,
    pub banner: String,
    pub check_args: Vec<String>,
    pub scenario_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub base_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub retry_backoff_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            arch: "amd64".to_string(),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            base_unit: DEFAULT_BASE_UNIT.to_string(),
            escalation: DEFAULT_ESCALATION.to_string(),
            install_url: DEFAULT_INSTALL_URL.to_string(),
            helper_unit: DEFAULT_HELPER_UNIT.to_string(),
            banner: PRODUCT_BANNER.to_string(),
            check_args: vec!["check".to_string(), JSON_FLAG.to_string()],
            scenario_timeout_secs: 1800,
            command_timeout_secs: 600,
            base_timeout_secs: 300,
            readiness_timeout_secs: 90,
            poll_initial_ms: 1000,
            poll_max_ms: 8000,
            retry_backoff_secs: 10,
        }
    }
}

/// `[scenario.readiness]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReadinessConfig {
    Unit {
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        state: Option<String>,
    },
    Binary {
        #[serde(default)]
        binary: Option<String>,
        #[serde(default)]
        banner: Option<String>,
    },
}

/// One `[[scenario]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,
    pub family: PackagingFamily,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub target: Backend,
    #[serde(default)]
    pub install: InstallOverrides,
    #[serde(default)]
    pub readiness: Option<ReadinessConfig>,
    /// Number of `fail` tokens the check output must contain
    #[serde(default)]
    pub expected_failures: usize,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub check_args: Option<Vec<String>>,
    /// Run the check through the escalation prefix
    #[serde(default)]
    pub escalate_check: bool,
    #[serde(default)]
    pub base_unit: Option<String>,
    #[serde(default)]
    pub escalation: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub readiness_timeout_secs: Option<u64>,
}

/// Complete scenario file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(rename = "scenario", default)]
    pub scenarios: Vec<ScenarioConfig>,
}

impl HarnessConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `./pkgsmoke.toml` if present, else the per-user config file if that exists
    pub fn default_config_path() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("pkgsmoke").join("scenarios.toml"))
            .filter(|path| path.exists())
    }

    /// Resolve every scenario, failing on the first invalid one
    pub fn plans(&self) -> Result<Vec<ScenarioPlan>, ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !seen.insert(scenario.name.as_str()) {
                return Err(ConfigError::DuplicateScenario(scenario.name.clone()));
            }
        }

        let registry = InstallerRegistry::new(
            &self.defaults.staging_dir,
            &self.defaults.install_url,
            &self.defaults.helper_unit,
        );
        self.scenarios
            .iter()
            .map(|scenario| self.resolve(scenario, &registry))
            .collect()
    }

    /// Plans for the named scenarios, all of them when `names` is empty
    pub fn select(&self, names: &[String]) -> Result<Vec<ScenarioPlan>, ConfigError> {
        let plans = self.plans()?;
        if names.is_empty() {
            return Ok(plans);
        }
        for name in names {
            if !plans.iter().any(|p| &p.name == name) {
                return Err(ConfigError::UnknownScenario(name.clone()));
            }
        }
        Ok(plans
            .into_iter()
            .filter(|p| names.contains(&p.name))
            .collect())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plans().map(|_| ())
    }

    fn resolve(
        &self,
        scenario: &ScenarioConfig,
        registry: &InstallerRegistry,
    ) -> Result<ScenarioPlan, ConfigError> {
        let defaults = &self.defaults;
        let name = scenario.name.clone();
        let arch = scenario.arch.clone().unwrap_or_else(|| defaults.arch.clone());
        let tool = scenario.tool.clone().unwrap_or_else(|| defaults.tool.clone());

        let install = registry.spec_for(scenario.family, &arch, &tool, &scenario.install)?;
        let readiness = self.readiness_for(scenario, &install.expected);

        let seconds = |field: &'static str, value: u64| -> Result<Duration, ConfigError> {
            if value == 0 {
                return Err(ConfigError::ZeroDuration {
                    scenario: name.clone(),
                    field,
                });
            }
            Ok(Duration::from_secs(value))
        };

        let scenario_timeout = seconds(
            "timeout_secs",
            scenario.timeout_secs.unwrap_or(defaults.scenario_timeout_secs),
        )?;
        let command_timeout = seconds("command_timeout_secs", defaults.command_timeout_secs)?;
        let base_timeout = seconds("base_timeout_secs", defaults.base_timeout_secs)?;
        let readiness_budget = seconds(
            "readiness_timeout_secs",
            scenario
                .readiness_timeout_secs
                .unwrap_or(defaults.readiness_timeout_secs),
        )?;

        if defaults.poll_initial_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                scenario: name,
                field: "poll_initial_ms",
            });
        }
        if defaults.poll_initial_ms > defaults.poll_max_ms {
            return Err(ConfigError::InvalidPollInterval {
                scenario: name,
                initial_ms: defaults.poll_initial_ms,
                max_ms: defaults.poll_max_ms,
            });
        }
        let backoff = Backoff::new(
            Duration::from_millis(defaults.poll_initial_ms),
            Duration::from_millis(defaults.poll_max_ms),
            readiness_budget,
        );

        let args = scenario
            .check_args
            .clone()
            .unwrap_or_else(|| defaults.check_args.clone());
        let check = CheckInvocation::new(&tool, args, scenario.escalate_check)?;

        let base_unit = scenario
            .base_unit
            .clone()
            .unwrap_or_else(|| defaults.base_unit.clone());
        let escalation = scenario
            .escalation
            .clone()
            .unwrap_or_else(|| defaults.escalation.clone());

        Ok(ScenarioPlan {
            name,
            family: scenario.family,
            arch,
            backend: scenario.target.clone(),
            escalation: Escalation::new(escalation),
            base_unit: Some(base_unit).filter(|u| !u.trim().is_empty()),
            base_timeout,
            install,
            readiness,
            backoff,
            check,
            policy: FailurePolicy::new(scenario.expected_failures),
            scenario_timeout,
            command_timeout,
            retry_backoff: Duration::from_secs(defaults.retry_backoff_secs),
        })
    }

    fn readiness_for(
        &self,
        scenario: &ScenarioConfig,
        expected: &ExpectedArtifacts,
    ) -> ReadinessCondition {
        let defaults = &self.defaults;
        match &scenario.readiness {
            Some(ReadinessConfig::Unit { unit, state }) => ReadinessCondition::UnitActive {
                unit: unit
                    .clone()
                    .or_else(|| expected.helper_unit.clone())
                    .unwrap_or_else(|| defaults.helper_unit.clone()),
                state: state.clone(),
            },
            Some(ReadinessConfig::Binary { binary, banner }) => ReadinessCondition::BinaryResponds {
                binary: binary.clone().unwrap_or_else(|| expected.binary.clone()),
                banner: banner.clone().unwrap_or_else(|| defaults.banner.clone()),
            },
            None => match &expected.helper_unit {
                Some(unit) => ReadinessCondition::UnitActive {
                    unit: unit.clone(),
                    state: Some(HELPER_READY_STATE.to_string()),
                },
                None => ReadinessCondition::BinaryResponds {
                    binary: expected.binary.clone(),
                    banner: defaults.banner.clone(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::InstallSource;

    fn parse(content: &str) -> Result<HarnessConfig, ConfigError> {
        HarnessConfig::parse(content, Path::new("test.toml"))
    }

    const SAMPLE: &str = r#"
[defaults]
tool = "paretosecurity"

[[scenario]]
name = "debian"
family = "deb"

[[scenario]]
name = "nixos"
family = "nix"
tool = "auditor"
expected_failures = 2
base_unit = ""
[scenario.target]
kind = "ssh"
host = "nixos-vm"

[[scenario]]
name = "fedora-release"
family = "script"
[scenario.install]
post_install = ["nc termbin.com 9999 < {log} > /tmp/paste_url.txt"]
"#;

    #[test]
    fn test_sample_resolves_with_defaults() {
        let config = parse(SAMPLE).unwrap();
        let plans = config.plans().unwrap();
        assert_eq!(plans.len(), 3);

        let debian = &plans[0];
        assert_eq!(debian.family, PackagingFamily::Deb);
        assert_eq!(debian.install.strategy, InstallStrategy::Dpkg);
        assert_eq!(debian.base_unit.as_deref(), Some("multi-user.target"));
        assert_eq!(debian.backend, Backend::Local);
        assert_eq!(
            debian.readiness,
            ReadinessCondition::UnitActive {
                unit: "pareto-linux.socket".to_string(),
                state: Some("active (listening)".to_string()),
            }
        );
        assert_eq!(debian.policy.expected_failures, 0);
        assert_eq!(debian.scenario_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_nix_defaults_to_binary_banner() {
        let plans = parse(SAMPLE).unwrap().plans().unwrap();
        let nixos = &plans[1];
        assert_eq!(nixos.install.source, InstallSource::Preinstalled);
        assert_eq!(nixos.base_unit, None);
        assert_eq!(nixos.policy.expected_failures, 2);
        assert_eq!(
            nixos.readiness,
            ReadinessCondition::BinaryResponds {
                binary: "auditor".to_string(),
                banner: "Pareto Security CLI".to_string(),
            }
        );
        assert!(matches!(nixos.backend, Backend::Ssh { .. }));
    }

    #[test]
    fn test_script_family_uses_install_url() {
        let plans = parse(SAMPLE).unwrap().plans().unwrap();
        let release = &plans[2];
        assert_eq!(
            release.install.source,
            InstallSource::RemoteScript {
                url: "https://pkg.paretosecurity.com/install.sh".to_string()
            }
        );
        assert_eq!(release.install.post_install.len(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = parse(
            r#"
[[scenario]]
name = "ubuntu"
family = "deb"
[[scenario]]
name = "ubuntu"
family = "deb"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateScenario(name)) if name == "ubuntu"
        ));
    }

    #[test]
    fn test_empty_config_rejected() {
        let config = parse("").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoScenarios)));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = parse(
            r#"
[[scenario]]
name = "ubuntu"
family = "deb"
expected_fail = 3
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_strategy_must_match_family() {
        let config = parse(
            r#"
[[scenario]]
name = "fedora"
family = "rpm"
[scenario.install]
strategy = "dpkg"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleStrategy { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = parse(
            r#"
[[scenario]]
name = "ubuntu"
family = "deb"
timeout_secs = 0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration { field: "timeout_secs", .. })
        ));
    }

    #[test]
    fn test_inverted_poll_bounds_rejected() {
        let config = parse(
            r#"
[defaults]
poll_initial_ms = 5000
poll_max_ms = 1000

[[scenario]]
name = "ubuntu"
family = "deb"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPollInterval { .. })
        ));
    }

    #[test]
    fn test_check_args_need_json_flag() {
        let config = parse(
            r#"
[[scenario]]
name = "ubuntu"
family = "deb"
check_args = ["check"]
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingJsonFlag { .. })
        ));
    }

    #[test]
    fn test_select_filters_and_rejects_unknown() {
        let config = parse(SAMPLE).unwrap();
        let picked = config.select(&["nixos".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "nixos");

        assert!(matches!(
            config.select(&["arch".to_string()]),
            Err(ConfigError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_readiness_override_running_state() {
        let config = parse(
            r#"
[[scenario]]
name = "nixos-helper"
family = "nix"
[scenario.readiness]
kind = "unit"
unit = "paretosecurity.socket"
state = "active (running)"
"#,
        )
        .unwrap();
        let plans = config.plans().unwrap();
        assert_eq!(
            plans[0].readiness,
            ReadinessCondition::UnitActive {
                unit: "paretosecurity.socket".to_string(),
                state: Some("active (running)".to_string()),
            }
        );
    }
}
