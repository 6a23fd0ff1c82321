//! Structured harness logging
//!
//! Scenario events go through the `log` facade as `message | {json}` lines so
//! CI logs stay greppable while carrying machine-readable detail. The facade
//! is backed by a `tracing-subscriber` stderr formatter.

use anyhow::{anyhow, Result};
use log::Level;
use serde_json::json;
use std::io::IsTerminal;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::models::{PackagingFamily, ScenarioOutcome};

/// Install a stderr `tracing` subscriber. `log` records reach it through the
/// `tracing-log` bridge, and `RUST_LOG` overrides `level` when set.
pub fn init(level: LevelFilter) -> Result<()> {
    let filter = filter_for(level, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to set logger: {}", e))
}

fn filter_for(level: LevelFilter, directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives.unwrap_or_default())
}

/// Map `--verbose` / `--quiet` onto a level filter
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Per-scenario event logger
#[derive(Debug, Clone)]
pub struct HarnessLogger {
    scenario: String,
    run_id: String,
}

impl HarnessLogger {
    pub fn new(scenario: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            run_id: run_id.into(),
        }
    }

    pub fn scenario_started(&self, family: PackagingFamily, transport: &str) {
        let data = json!({
            "event": "scenario_started",
            "family": family.as_str(),
            "transport": transport,
        });
        self.log_structured(Level::Info, &format!("Starting scenario {}", self.scenario), data);
    }

    pub fn step_started(&self, step: &str) {
        let data = json!({ "event": "step_started", "step": step });
        self.log_structured(Level::Info, &format!("[{}] {}", self.scenario, step), data);
    }

    pub fn install_retry(&self, attempt: u32, backoff: Duration, reason: &str) {
        let data = json!({
            "event": "install_retry",
            "attempt": attempt,
            "backoff_ms": backoff.as_millis() as u64,
            "reason": reason,
        });
        self.log_structured(
            Level::Warn,
            &format!("[{}] remote install fetch failed, retrying", self.scenario),
            data,
        );
    }

    /// Polls are the expected shape of service startup, not errors
    pub fn readiness_poll(&self, condition: &str, attempt: u32, elapsed: Duration) {
        let data = json!({
            "event": "readiness_poll",
            "condition": condition,
            "attempt": attempt,
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        self.log_structured(Level::Debug, &format!("[{}] waiting for {}", self.scenario, condition), data);
    }

    pub fn readiness_timeout(&self, condition: &str, waited: Duration) {
        let data = json!({
            "event": "readiness_timeout",
            "condition": condition,
            "waited_ms": waited.as_millis() as u64,
        });
        self.log_structured(
            Level::Warn,
            &format!("[{}] {} never became ready", self.scenario, condition),
            data,
        );
    }

    pub fn scenario_finished(&self, outcome: &ScenarioOutcome) {
        let data = json!({
            "event": "scenario_finished",
            "verdict": outcome.verdict(),
            "duration_ms": outcome.duration_ms(),
        });
        let level = if outcome.passed() { Level::Info } else { Level::Error };
        self.log_structured(level, &format!("Finished scenario {}", self.scenario), data);
    }

    fn log_structured(&self, level: Level, message: &str, mut data: serde_json::Value) {
        if let Some(fields) = data.as_object_mut() {
            fields.insert("scenario".to_string(), json!(self.scenario));
            fields.insert("run_id".to_string(), json!(self.run_id));
            fields.insert("timestamp".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        }
        log::log!(level, "{} | {}", message, data);
    }
}
