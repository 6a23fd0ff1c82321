//! CLI argument parsing module
//!
//! Handles the command-line interface using clap, including:
//! - `run`: install and smoke-test configured scenarios
//! - `list` / `validate`: inspect a scenarios file without touching targets
//! - `count`: aggregate a saved `check --json` output offline
//! - Output format selection (human/JSON) and verbosity

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

const VERSION: &str = concat!(env!("PKGSMOKE_VERSION"), " (", env!("GIT_HASH"), ")");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub scenarios: Vec<String>,
    pub json: bool,
    pub sequential: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Run(RunArgs),
    List { config: Option<PathBuf> },
    Validate { config: Option<PathBuf> },
    /// `None` or `-` reads stdin
    Count { input: Option<PathBuf>, json: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: CliCommand,
    pub verbose: u8,
    pub quiet: bool,
}

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Scenarios file (default: ./pkgsmoke.toml, then the user config dir)")
        .value_parser(value_parser!(PathBuf))
}

fn json_arg(help: &'static str) -> Arg {
    Arg::new("json")
        .short('j')
        .long("json")
        .help(help)
        .action(ArgAction::SetTrue)
}

pub fn build_cli() -> Command {
    Command::new("pkgsmoke")
        .version(VERSION)
        .about("Install-and-smoke-test harness for the Pareto Security CLI")
        .long_about(
            "Installs the Pareto Security CLI on each configured target, waits for its \
             privileged helper, runs `check --json` and turns the result into a verdict \
             and an exit code.",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (repeatable)")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run scenarios and report verdicts")
                .arg(config_arg())
                .arg(
                    Arg::new("scenario")
                        .short('s')
                        .long("scenario")
                        .value_name("NAME")
                        .help("Only run the named scenario (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(json_arg("Output the report in JSON format"))
                .arg(
                    Arg::new("sequential")
                        .long("sequential")
                        .help("Run scenarios one after another")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List configured scenarios")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a scenarios file")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("count")
                .about("Count failures in a saved `check --json` output")
                .arg(
                    Arg::new("input")
                        .value_name("FILE")
                        .help("Saved output, `-` or absent for stdin")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(json_arg("Output counts in JSON format")),
        )
}

fn config_of(matches: &ArgMatches) -> Option<PathBuf> {
    matches.get_one::<PathBuf>("config").cloned()
}

/// Turn parsed matches into [`CliArgs`]
pub fn from_matches(matches: &ArgMatches) -> CliArgs {
    let command = match matches.subcommand() {
        Some(("run", sub)) => CliCommand::Run(RunArgs {
            config: config_of(sub),
            scenarios: sub
                .get_many::<String>("scenario")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            json: sub.get_flag("json"),
            sequential: sub.get_flag("sequential"),
        }),
        Some(("list", sub)) => CliCommand::List {
            config: config_of(sub),
        },
        Some(("validate", sub)) => CliCommand::Validate {
            config: config_of(sub),
        },
        Some(("count", sub)) => CliCommand::Count {
            input: sub
                .get_one::<PathBuf>("input")
                .filter(|p| p.as_os_str() != "-")
                .cloned(),
            json: sub.get_flag("json"),
        },
        // subcommand_required rules this out
        _ => CliCommand::Validate { config: None },
    };

    CliArgs {
        command,
        verbose: matches.get_count("verbose"),
        quiet: matches.get_flag("quiet"),
    }
}

/// Parse `args`, returning clap's error for help, version and usage problems
pub fn try_parse_from<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    build_cli().try_get_matches_from(args).map(|m| from_matches(&m))
}
