//! Readiness prober
//!
//! Polls a [`ReadinessCondition`] with exponential backoff until it holds or
//! the wait budget is spent. Readiness is binary: a probe ends `Ready` or
//! `TimedOut`, never degraded.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{HarnessError, Result};
use crate::logging::HarnessLogger;
use crate::models::{CapturedLog, CommandOutput, Escalation};
use crate::target::{shell_quote, Target, Transport};

/// Lines of unit journal attached to a readiness timeout
const JOURNAL_LINES: u32 = 50;

/// Something that must hold before the audited tool can be checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCondition {
    /// A systemd unit is active. With `state`, `systemctl status` must
    /// contain it, e.g. `active (listening)` rather than a bare `active`.
    UnitActive { unit: String, state: Option<String> },
    /// `<binary> --help` succeeds and prints `banner`
    BinaryResponds { binary: String, banner: String },
}

impl ReadinessCondition {
    fn probe_command(&self, escalation: &Escalation) -> String {
        match self {
            ReadinessCondition::UnitActive { unit, state: None } => {
                format!("systemctl is-active {}", shell_quote(unit))
            }
            ReadinessCondition::UnitActive { unit, state: Some(_) } => {
                escalation.wrap(&format!("systemctl status {} --no-pager", shell_quote(unit)))
            }
            ReadinessCondition::BinaryResponds { binary, .. } => format!("{} --help", binary),
        }
    }

    fn is_satisfied(&self, out: &CommandOutput) -> bool {
        match self {
            ReadinessCondition::UnitActive { state: None, .. } => {
                out.success() && out.output.lines().any(|line| line.trim() == "active")
            }
            ReadinessCondition::UnitActive { state: Some(state), .. } => out.output.contains(state.as_str()),
            ReadinessCondition::BinaryResponds { banner, .. } => {
                out.success() && out.output.contains(banner.as_str())
            }
        }
    }

    async fn diagnostics<T: Transport>(
        &self,
        target: &Target<T>,
        escalation: &Escalation,
        last_output: Option<&str>,
    ) -> Vec<CapturedLog> {
        let mut logs = Vec::new();
        if let Some(last) = last_output {
            logs.push(CapturedLog::new("last probe output", last));
        }

        let commands = match self {
            ReadinessCondition::UnitActive { unit, .. } => {
                let unit = shell_quote(unit);
                vec![
                    ("unit status", escalation.wrap(&format!("systemctl status {} --no-pager", unit))),
                    (
                        "unit journal",
                        escalation.wrap(&format!(
                            "journalctl -u {} --no-pager -n {}",
                            unit, JOURNAL_LINES
                        )),
                    ),
                ]
            }
            ReadinessCondition::BinaryResponds { binary, .. } => {
                vec![("binary lookup", format!("command -v {}", binary))]
            }
        };

        for (label, command) in commands {
            let content = match target.execute(&command).await {
                Ok(out) => out.output,
                Err(e) => format!("could not collect {}: {}", label, e),
            };
            logs.push(CapturedLog::new(label, content));
        }
        logs
    }
}

impl fmt::Display for ReadinessCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessCondition::UnitActive { unit, state: None } => write!(f, "unit {} active", unit),
            ReadinessCondition::UnitActive { unit, state: Some(state) } => {
                write!(f, "unit {} {}", unit, state)
            }
            ReadinessCondition::BinaryResponds { binary, banner } => {
                write!(f, "{} --help reporting \"{}\"", binary, banner)
            }
        }
    }
}

/// Poll schedule: start at `initial`, double each time, never exceed
/// `max_interval`, give up once `budget` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_interval: Duration,
    pub budget: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            // systemd's DefaultTimeoutStartSec
            budget: Duration::from_secs(90),
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max_interval: Duration, budget: Duration) -> Self {
        Self {
            initial,
            max_interval,
            budget,
        }
    }

    pub fn with_budget(self, budget: Duration) -> Self {
        Self { budget, ..self }
    }

    fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Terminal state of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready {
        attempts: u32,
        waited: Duration,
    },
    TimedOut {
        attempts: u32,
        waited: Duration,
        last_output: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Prober {
    backoff: Backoff,
}

impl Prober {
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    /// Poll `condition` until it holds or the budget runs out
    pub async fn probe<T: Transport>(
        &self,
        target: &Target<T>,
        condition: &ReadinessCondition,
        escalation: &Escalation,
        logger: Option<&HarnessLogger>,
    ) -> Result<Readiness> {
        let command = condition.probe_command(escalation);
        let description = condition.to_string();
        let start = Instant::now();
        let mut interval = self.backoff.initial;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let out = target.execute(&command).await?;
            if condition.is_satisfied(&out) {
                return Ok(Readiness::Ready {
                    attempts,
                    waited: start.elapsed(),
                });
            }

            let elapsed = start.elapsed();
            if let Some(logger) = logger {
                logger.readiness_poll(&description, attempts, elapsed);
            }
            if elapsed >= self.backoff.budget {
                return Ok(Readiness::TimedOut {
                    attempts,
                    waited: elapsed,
                    last_output: Some(out.output),
                });
            }

            let remaining = self.backoff.budget - elapsed;
            tokio::time::sleep(interval.min(remaining)).await;
            interval = self.backoff.next(interval);
        }
    }

    /// Like [`Prober::probe`], but a timeout becomes
    /// [`HarnessError::ReadinessTimeout`] with unit status and journal attached
    pub async fn wait<T: Transport>(
        &self,
        target: &Target<T>,
        condition: &ReadinessCondition,
        escalation: &Escalation,
        logger: Option<&HarnessLogger>,
    ) -> Result<Duration> {
        match self.probe(target, condition, escalation, logger).await? {
            Readiness::Ready { waited, .. } => Ok(waited),
            Readiness::TimedOut {
                waited,
                last_output,
                ..
            } => {
                let description = condition.to_string();
                if let Some(logger) = logger {
                    logger.readiness_timeout(&description, waited);
                }
                let diagnostics = condition
                    .diagnostics(target, escalation, last_output.as_deref())
                    .await;
                Err(HarnessError::ReadinessTimeout {
                    condition: description,
                    waited,
                    diagnostics,
                })
            }
        }
    }
}
