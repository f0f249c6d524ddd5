//! RedBus stack verifier.
//!
//! Brings the docker-compose stack up (or reuses a healthy one), waits for
//! every service in dependency order, runs the integration scenario and
//! prints a report.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use rbv_common::probes::snapshot;
use rbv_common::readiness::teardown;
use rbv_common::report::render_status;
use rbv_common::{
    ApiClient, ComposeStack, LogConfig, Pipeline, RunReport, StackProbes, VerifyConfig,
    VerifyError, init_logging,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "rbv")]
#[command(author, version, about = "RedBus stack verifier - readiness and integration checks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (TOML). Defaults to rbv.toml in the project directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing docker-compose.yml
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Base URL of the application API
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring up, wait for readiness, seed, test and report (default)
    Run(RunArgs),

    /// Probe every service once and print its health
    Probe,

    /// Run only the integration scenario against a running stack
    Scenario,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Restart the stack even when it is already healthy
    #[arg(long)]
    force_bring_up: bool,

    /// Do not seed baseline demo data
    #[arg(long)]
    skip_seed: bool,

    /// Do not run the backend unit tests
    #[arg(long)]
    skip_unit_tests: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Unhandled error");
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = match VerifyConfig::load(cli.config.as_deref(), cli.project_dir.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(fail(&VerifyError::from(e))),
    };
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    let command = cli.command.unwrap_or(Commands::Run(RunArgs::default()));
    if let Commands::Run(args) = &command {
        config.readiness.force_bring_up |= args.force_bring_up;
        config.seed.enabled &= !args.skip_seed;
        config.unit_tests.enabled &= !args.skip_unit_tests;
    }

    let stack = ComposeStack::new(&config);
    let probes = StackProbes::new(&config).context("Failed to create health probes")?;
    let client = ApiClient::from_config(&config.api).context("Failed to create API client")?;
    let pipeline = Pipeline::new(&config, &stack, &probes, &client);
    info!(
        project_dir = %config.project_dir.display(),
        base_url = %config.api.base_url,
        "Starting"
    );

    match command {
        Commands::Run(_) => {
            tokio::select! {
                result = pipeline.run() => match result {
                    Ok(report) => {
                        print_report(&report, cli.json)?;
                        Ok(ExitCode::SUCCESS)
                    }
                    Err(e) => Ok(fail(&e)),
                },
                _ = tokio::signal::ctrl_c() => {
                    let err = VerifyError::Interrupted;
                    if err.requires_teardown() {
                        warn!("Interrupted, stopping the stack");
                        teardown(&stack).await;
                    }
                    Ok(fail(&err))
                }
            }
        }
        Commands::Probe => {
            tokio::select! {
                statuses = snapshot(&probes) => {
                    let healthy = statuses.iter().all(|s| s.state.is_healthy());
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&statuses)?);
                    } else {
                        println!("{}", "SYSTEM STATUS".bold());
                        print!("{}", render_status(&statuses));
                    }
                    Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
                }
                _ = tokio::signal::ctrl_c() => Ok(fail(&VerifyError::Interrupted)),
            }
        }
        Commands::Scenario => {
            tokio::select! {
                report = pipeline.run_scenario_only() => {
                    print_report(&report, cli.json)?;
                    Ok(ExitCode::SUCCESS)
                }
                _ = tokio::signal::ctrl_c() => Ok(fail(&VerifyError::Interrupted)),
            }
        }
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

/// Report a terminal error and map it to its exit code.
fn fail(err: &VerifyError) -> ExitCode {
    error!(error = %err, exit_code = err.exit_code(), "Run failed");
    eprintln!("{} {err}", "error:".red().bold());
    ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
}
