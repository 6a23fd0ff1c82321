#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A local "target": stub package manager and audited tool on a private PATH,
/// plus a staging directory for artifacts.
pub struct LocalTarget {
    pub temp_dir: TempDir,
}

impl LocalTarget {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        fs::create_dir_all(temp_dir.path().join("bin"))?;
        fs::create_dir_all(temp_dir.path().join("package"))?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.path().join("bin")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.path().join("package")
    }

    /// Marker file a stub touches when it runs
    pub fn called_marker(&self, name: &str) -> PathBuf {
        self.path().join(format!("{}.called", name))
    }

    pub fn write_stub(&self, name: &str, body: &str) -> anyhow::Result<()> {
        let path = self.bin_dir().join(name);
        let script = format!(
            "#!/bin/sh\ntouch '{}'\n{}\n",
            self.called_marker(name).display(),
            body
        );
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    /// `dpkg` stub printing an install line and exiting with `code`
    pub fn stub_dpkg(&self, code: i32) -> anyhow::Result<()> {
        self.write_stub(
            "dpkg",
            &format!("echo \"Setting up paretosecurity ($*)\"\nexit {}", code),
        )
    }

    /// Audited tool stub: `--help` prints the banner, `check` prints
    /// `check_output` and exits with `check_exit`
    pub fn stub_tool(&self, check_output: &str, check_exit: i32) -> anyhow::Result<()> {
        let output_file = self.path().join("check-output.json");
        fs::write(&output_file, check_output)?;
        self.write_stub(
            "paretosecurity",
            &format!(
                "case \"$1\" in\n  --help) echo \"Pareto Security CLI is a tool for auditing your Linux machine\" ;;\n  check) cat '{}'; exit {} ;;\nesac",
                output_file.display(),
                check_exit
            ),
        )
    }

    pub fn stage_artifact(&self, name: &str) -> anyhow::Result<()> {
        fs::write(self.staging_dir().join(name), b"!<arch>\n")?;
        Ok(())
    }

    /// PATH with the stub directory first
    pub fn path_env(&self) -> String {
        format!(
            "{}:{}",
            self.bin_dir().display(),
            std::env::var("PATH").unwrap_or_default()
        )
    }

    /// Write a scenarios file with one local deb scenario
    pub fn write_config(&self, scenario_extra: &str) -> anyhow::Result<PathBuf> {
        let config = format!(
            r#"
[defaults]
escalation = ""
base_unit = ""
staging_dir = "{staging}"
scenario_timeout_secs = 60
command_timeout_secs = 30
readiness_timeout_secs = 5
poll_initial_ms = 100
poll_max_ms = 500

[[scenario]]
name = "debian-local"
family = "deb"
{scenario_extra}
[scenario.readiness]
kind = "binary"
"#,
            staging = self.staging_dir().display(),
        );
        let path = self.path().join("pkgsmoke.toml");
        fs::write(&path, config)?;
        Ok(path)
    }
}

pub const CLEAN_CHECK: &str = r#"{
  "2e46c89a-5461-4865-a92e-3b799c12034a": "passed",
  "44e4754a-0b42-4964-9cc2-b88b2023cb1e": "passed",
  "7434560b-ea7c-4b5c-85a0-0b9ba9b2a4b5": "skipped"
}
"#;

pub const TWO_FAILED_CHECK: &str = r#"{
  "2e46c89a-5461-4865-a92e-3b799c12034a": "failed",
  "44e4754a-0b42-4964-9cc2-b88b2023cb1e": "failed",
  "7434560b-ea7c-4b5c-85a0-0b9ba9b2a4b5": "passed"
}
"#;
