//! Check invoker
//!
//! Runs the audited tool's machine-readable check and hands back its output
//! untouched. Interpretation belongs to [`crate::aggregate`].

use crate::config::ConfigError;
use crate::constants::JSON_FLAG;
use crate::error::{HarnessError, Result};
use crate::models::{CommandOutput, Escalation};
use crate::target::{shell_quote, Target, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInvocation {
    tool: String,
    args: Vec<String>,
    escalate: bool,
}

impl CheckInvocation {
    pub fn new(
        tool: impl Into<String>,
        args: Vec<String>,
        escalate: bool,
    ) -> std::result::Result<Self, ConfigError> {
        if !args.iter().any(|a| a == JSON_FLAG) {
            return Err(ConfigError::MissingJsonFlag { flag: JSON_FLAG });
        }
        Ok(Self {
            tool: tool.into(),
            args,
            escalate,
        })
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn command(&self, escalation: &Escalation) -> String {
        let mut command = shell_quote(&self.tool);
        for arg in &self.args {
            command.push(' ');
            command.push_str(&shell_quote(arg));
        }
        if self.escalate {
            escalation.wrap(&command)
        } else {
            command
        }
    }

    /// Run the check. The tool reports failing checks in its output and
    /// exits 0, so any non-zero exit means it crashed or could not start.
    pub async fn invoke<T: Transport>(
        &self,
        target: &Target<T>,
        escalation: &Escalation,
    ) -> Result<CommandOutput> {
        let command = self.command(escalation);
        let out = target.execute(&command).await?;
        if !out.success() {
            return Err(HarnessError::CommandFailed {
                command,
                exit_code: out.exit_code,
                output: out.output,
            });
        }
        Ok(out)
    }
}
