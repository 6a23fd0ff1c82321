//! Global constants for pkgsmoke
//!
//! Centralized location for product strings, defaults and exit codes

/// Product banner printed by `<tool> --help`
pub const PRODUCT_BANNER: &str = "Pareto Security CLI";

/// Default name of the audited binary
pub const DEFAULT_TOOL: &str = "paretosecurity";

/// Literal token counted as one failed check
pub const FAIL_TOKEN: &str = "fail";

/// Marker emitted by the tool when its privileged helper is unreachable
pub const HELPER_UNAVAILABLE_MARKER: &str = "Failed to connect to helper";

/// Socket unit of the privileged helper
pub const DEFAULT_HELPER_UNIT: &str = "pareto-linux.socket";

/// Unit state that means the helper socket accepts connections
pub const HELPER_READY_STATE: &str = "active (listening)";

/// Unit that marks base OS readiness
pub const DEFAULT_BASE_UNIT: &str = "multi-user.target";

/// Where package artifacts are mounted inside the target
pub const DEFAULT_STAGING_DIR: &str = "/mnt/package";

/// Versioned endpoint serving the POSIX install script
pub const DEFAULT_INSTALL_URL: &str = "https://pkg.paretosecurity.com/install.sh";

/// Default privilege escalation prefix
pub const DEFAULT_ESCALATION: &str = "sudo";

/// Flag that asks the tool for machine-readable output
pub const JSON_FLAG: &str = "--json";

/// Marker line written by the exit-code capture wrapper
pub const EXIT_MARKER: &str = "__PKGSMOKE_EXIT__";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "pkgsmoke.toml";

/// Exit codes of the harness process
pub const EXIT_OK: i32 = 0;
pub const EXIT_INSTALL: i32 = 1;
pub const EXIT_READINESS: i32 = 2;
pub const EXIT_CHECK_ASSERTION: i32 = 3;
pub const EXIT_SCENARIO_TIMEOUT: i32 = 4;
pub const EXIT_HELPER_DEFECT: i32 = 5;
pub const EXIT_ENVIRONMENT: i32 = 6;
pub const EXIT_USAGE: i32 = 64;
pub const EXIT_INTERRUPTED: i32 = 130;
