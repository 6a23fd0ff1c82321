//! Target environment adapter
//!
//! A [`Target`] is a machine under test reached through a [`Transport`].
//! It runs commands, never escalates privileges on its own, and bounds every
//! command with a harness-level timeout.

pub mod shell;

#[cfg(test)]
pub(crate) mod scripted;

use log::debug;
use std::future::Future;
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::models::{CommandOutput, Escalation, PackagingFamily};
use crate::readiness::{Backoff, Prober, ReadinessCondition};

pub use shell::{shell_quote, Backend, ShellTransport};

/// A way to run a shell script on a machine and collect its exit code and
/// combined output. Errors are reserved for failing to run the script at all.
pub trait Transport: Send + Sync {
    fn execute(&self, script: &str) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Short human-readable address of the machine
    fn describe(&self) -> String;
}

/// Handle to one machine under test
#[derive(Debug)]
pub struct Target<T> {
    family: PackagingFamily,
    arch: String,
    transport: T,
    command_timeout: Duration,
}

impl<T: Transport> Target<T> {
    pub fn new(
        family: PackagingFamily,
        arch: impl Into<String>,
        transport: T,
        command_timeout: Duration,
    ) -> Self {
        Self {
            family,
            arch: arch.into(),
            transport,
            command_timeout,
        }
    }

    pub fn family(&self) -> PackagingFamily {
        self.family
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `command` and return its exit code and output whatever the exit code
    pub async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("[{}] $ {}", self.transport.describe(), command);

        match tokio::time::timeout(self.command_timeout, self.transport.execute(command)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::CommandTimeout {
                command: command.to_string(),
                timeout: self.command_timeout,
            }),
        }
    }

    /// Run `command`, failing with [`HarnessError::CommandFailed`] on a non-zero exit
    pub async fn run(&self, command: &str) -> Result<String> {
        let out = self.execute(command).await?;
        if !out.success() {
            return Err(HarnessError::CommandFailed {
                command: command.to_string(),
                exit_code: out.exit_code,
                output: out.output,
            });
        }
        Ok(out.output)
    }

    /// Block until systemd reports `unit` active or `timeout` elapses
    pub async fn wait_for_unit(&self, unit: &str, timeout: Duration) -> Result<Duration> {
        let prober = Prober::new(Backoff::default().with_budget(timeout));
        let condition = ReadinessCondition::UnitActive {
            unit: unit.to_string(),
            state: None,
        };
        prober.wait(self, &condition, &Escalation::none(), None).await
    }
}
