//! Exit-code capture for install commands
//!
//! A shell pipeline reports the status of its last stage, so the status of an
//! install followed by log upload or `tee` would be lost. The wrapper stores
//! `$?` right after the install command and reports it on a marker line after
//! every later stage has run.

use crate::constants::EXIT_MARKER;
use crate::target::shell_quote;

/// Placeholder in post-install stages replaced by the quoted log path
pub const LOG_PLACEHOLDER: &str = "{log}";

/// Build a script running `inner` with its output in `log_path`, then each
/// of `post_stages`, then printing the log and the captured exit code.
pub fn wrap(inner: &str, log_path: &str, post_stages: &[String]) -> String {
    let log = shell_quote(log_path);
    let mut script = format!("( {}\n) > {} 2>&1\n__pkgsmoke_rc=$?\n", inner, log);
    for stage in post_stages {
        script.push_str(&stage.replace(LOG_PLACEHOLDER, &log));
        script.push('\n');
    }
    script.push_str(&format!("cat {}\n", log));
    // The log may not end in a newline, so the marker starts its own line
    script.push_str(&format!(
        "printf '\\n%s=%s\\n' {} \"$__pkgsmoke_rc\"\n",
        EXIT_MARKER
    ));
    script
}

/// Output of a wrapped command with the marker lines removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRun {
    /// Exit code of the inner command, if the wrapper got to report it
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Read the exit code from the last marker line of `output`
pub fn parse(output: &str) -> CapturedRun {
    let prefix = format!("{}=", EXIT_MARKER);
    let mut exit_code = None;
    let mut kept: Vec<&str> = Vec::new();

    for line in output.lines() {
        match line.trim().strip_prefix(prefix.as_str()) {
            Some(code) => {
                exit_code = code.trim().parse::<i32>().ok();
                // Blank line the wrapper puts ahead of the marker
                if kept.last().is_some_and(|l| l.is_empty()) {
                    kept.pop();
                }
            }
            None => kept.push(line),
        }
    }

    let mut text = kept.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    CapturedRun {
        exit_code,
        output: text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{ShellTransport, Transport};

    #[test]
    fn test_wrap_captures_status_before_post_stages() {
        let script = wrap(
            "curl -sL pkg.paretosecurity.com/install.sh | sudo bash",
            "/tmp/install.log",
            &["nc termbin.com 9999 < {log} > /tmp/paste_url.txt".to_string()],
        );
        let rc_at = script.find("__pkgsmoke_rc=$?").unwrap();
        let stage_at = script.find("nc termbin.com").unwrap();
        let marker_at = script.find(EXIT_MARKER).unwrap();
        assert!(rc_at < stage_at);
        assert!(stage_at < marker_at);
        assert!(script.contains("< /tmp/install.log >"));
    }

    #[test]
    fn test_parse_takes_last_marker() {
        let output = format!(
            "Setting up paretosecurity\n{m}=7\nmore\n{m}=0\n",
            m = EXIT_MARKER
        );
        let run = parse(&output);
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.output, "Setting up paretosecurity\nmore\n");
    }

    #[test]
    fn test_parse_without_marker() {
        let run = parse("Connection reset by peer\n");
        assert_eq!(run.exit_code, None);
        assert_eq!(run.output, "Connection reset by peer\n");
    }

    #[test]
    fn test_parse_drops_separator_line() {
        let output = format!("Setting up paretosecurity\n\n{}=0\n", EXIT_MARKER);
        let run = parse(&output);
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.output, "Setting up paretosecurity\n");
    }

    #[tokio::test]
    async fn test_marker_survives_log_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("install.log");
        let script = wrap("printf 'installed ok'", &log.display().to_string(), &[]);

        let out = ShellTransport::local().execute(&script).await.unwrap();
        let run = parse(&out.output);
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.output, "installed ok\n");
    }

    #[tokio::test]
    async fn test_local_shell_reports_inner_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("install.log");
        let script = wrap(
            "echo 'dpkg: error processing'; exit 1",
            &log.display().to_string(),
            &["false".to_string()],
        );

        let out = ShellTransport::local().execute(&script).await.unwrap();
        let run = parse(&out.output);
        assert_eq!(run.exit_code, Some(1));
        assert_eq!(run.output, "dpkg: error processing\n");
    }
}
