#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use tokio::time::Instant;

use pkgsmoke::aggregate::{ResultParser, SubstringParser};
use pkgsmoke::cli::{self, CliCommand, RunArgs};
use pkgsmoke::config::{ConfigError, HarnessConfig};
use pkgsmoke::constants::{
    EXIT_ENVIRONMENT, EXIT_INTERRUPTED, EXIT_OK, EXIT_USAGE, LOCAL_CONFIG_FILE,
};
use pkgsmoke::models::{CommandOutput, HarnessReport};
use pkgsmoke::scenario::{self, ScenarioPlan};
use pkgsmoke::{logging, output};

fn main() {
    let args = match cli::try_parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_OK };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = logging::init(logging::level_for(args.verbose, args.quiet)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(EXIT_ENVIRONMENT);
    }

    let code = match dispatch(args.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ConfigError>().is_some() {
                EXIT_USAGE
            } else {
                EXIT_ENVIRONMENT
            }
        }
    };
    std::process::exit(code);
}

fn dispatch(command: CliCommand) -> Result<i32> {
    match command {
        CliCommand::Run(args) => run(args),
        CliCommand::List { config } => {
            let (_, config) = load_config(config)?;
            print!("{}", output::render_plans(&config.plans()?));
            Ok(EXIT_OK)
        }
        CliCommand::Validate { config } => {
            let (path, config) = load_config(config)?;
            config.validate()?;
            println!(
                "{}: {} scenario(s) OK",
                path.display(),
                config.scenarios.len()
            );
            Ok(EXIT_OK)
        }
        CliCommand::Count { input, json } => count(input, json),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<(PathBuf, HarnessConfig)> {
    let path = path
        .or_else(HarnessConfig::default_config_path)
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));
    let config = HarnessConfig::load_from_file(&path)?;
    Ok((path, config))
}

fn run(args: RunArgs) -> Result<i32> {
    let (path, config) = load_config(args.config.clone())?;
    let plans = config.select(&args.scenarios)?;
    info!("Loaded {} scenario(s) from {}", plans.len(), path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run_scenarios(plans, args))
}

async fn run_scenarios(plans: Vec<ScenarioPlan>, args: RunArgs) -> Result<i32> {
    let start = Instant::now();
    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let run =
        scenario::run_until(plans, args.sequential, ScenarioPlan::transport, interrupted).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let (report, code) = if run.interrupted {
        warn!(
            "Interrupted, stopped after {} finished scenario(s)",
            run.outcomes.len()
        );
        (HarnessReport::new(run.outcomes, duration_ms, true), EXIT_INTERRUPTED)
    } else {
        let report = HarnessReport::new(run.outcomes, duration_ms, false);
        let code = report.exit_code();
        (report, code)
    };

    if args.json {
        output::format_json(&report)?;
    } else {
        output::format_human(&report)?;
    }
    Ok(code)
}

fn count(input: Option<PathBuf>, as_json: bool) -> Result<i32> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read check output from stdin")?;
            raw
        }
    };

    let result = SubstringParser::default().parse(&CommandOutput {
        exit_code: 0,
        output: raw,
    });

    if as_json {
        let counts = json!({
            "total_checks": result.total_checks,
            "fail": result.fail_tokens,
            "helper_unavailable": result.helper_failures,
            "failed": result.failed(),
        });
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        print!("{}", output::render_count(&result));
    }
    Ok(EXIT_OK)
}
