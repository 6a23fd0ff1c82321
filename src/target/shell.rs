//! Shell-backed transports: local host, SSH, and container exec
//!
//! The script is always handed to `sh -c` on the far side with stderr folded
//! into stdout, so callers see output in the order it was produced.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use crate::error::{HarnessError, Result};
use crate::models::CommandOutput;
use crate::target::Transport;

fn default_container_program() -> String {
    "docker".to_string()
}

/// How commands reach the target machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backend {
    /// The machine the harness runs on
    #[default]
    Local,
    /// A VM or remote host reachable over SSH
    Ssh {
        host: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        identity: Option<PathBuf>,
        /// Extra `-o` options, e.g. `StrictHostKeyChecking=no`
        #[serde(default)]
        options: Vec<String>,
    },
    /// A running container
    Docker {
        container: String,
        /// Container CLI, `docker` or `podman`
        #[serde(default = "default_container_program")]
        program: String,
    },
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Transport that runs scripts through `sh -c` on the selected backend
#[derive(Debug, Clone)]
pub struct ShellTransport {
    backend: Backend,
}

impl ShellTransport {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn local() -> Self {
        Self::new(Backend::Local)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn command_for(&self, script: &str) -> Command {
        let wrapped = format!("exec 2>&1\n{}", script);

        let mut cmd = match &self.backend {
            Backend::Local => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(wrapped);
                cmd
            }
            Backend::Ssh {
                host,
                user,
                port,
                identity,
                options,
            } => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                for option in options {
                    cmd.arg("-o").arg(option);
                }
                if let Some(port) = port {
                    cmd.arg("-p").arg(port.to_string());
                }
                if let Some(identity) = identity {
                    cmd.arg("-i").arg(identity);
                }
                let destination = match user {
                    Some(user) => format!("{}@{}", user, host),
                    None => host.clone(),
                };
                // ssh joins its trailing arguments into one remote command line
                cmd.arg(destination)
                    .arg(format!("sh -c {}", shell_quote(&wrapped)));
                cmd
            }
            Backend::Docker { container, program } => {
                let mut cmd = Command::new(program);
                cmd.args(["exec", container.as_str(), "sh", "-c"]).arg(wrapped);
                cmd
            }
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Transport for ShellTransport {
    async fn execute(&self, script: &str) -> Result<CommandOutput> {
        let output = self
            .command_for(script)
            .output()
            .await
            .map_err(|source| HarnessError::Transport {
                command: script.to_string(),
                source,
            })?;

        // Anything on stderr here came from the launcher itself (ssh, docker)
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(CommandOutput {
            exit_code: exit_code(output.status),
            output: combined,
        })
    }

    fn describe(&self) -> String {
        match &self.backend {
            Backend::Local => "local".to_string(),
            Backend::Ssh { host, user, .. } => match user {
                Some(user) => format!("ssh://{}@{}", user, host),
                None => format!("ssh://{}", host),
            },
            Backend::Docker { container, program } => format!("{}://{}", program, container),
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}
