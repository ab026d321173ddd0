//! SlotDispatch - dispatch queued shell commands to remote hosts
//!
//! CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use slotdispatch::cli::Cli;
use slotdispatch::config::Config;
use slotdispatch::error::{EXIT_CANCELLED, EXIT_OK, exit_code_for};
use slotdispatch::shutdown::install_shutdown_handler;
use slotdispatch::{CommandStatusProbe, Dispatcher, HostTable, RunOutcome, ShellLauncher};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

async fn run(cli: Cli, config: Result<Config>) -> Result<RunOutcome> {
    let mut config = config.context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let hosts = HostTable::from_specs(&cli.hosts).context("Failed to parse host specs")?;
    for line in hosts.summary() {
        println!("{}", line);
    }

    let probe = Arc::new(CommandStatusProbe::new(
        config.remote.status_program.clone(),
        config.remote.status_args.clone(),
    ));
    let launcher = Arc::new(ShellLauncher::new(config.remote.launch_program.clone()));
    let mut dispatcher = Dispatcher::new(hosts, &cli.command_file, config.dispatch.clone(), probe, launcher);

    let cancel = install_shutdown_handler();
    let outcome = dispatcher
        .run(cancel)
        .await
        .with_context(|| format!("Dispatch stopped (command file {})", cli.command_file.display()))?;

    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    println!("slotdispatch --- slot-aware command dispatcher");

    // Loaded once; its log level is needed before anything can be logged
    let config = Config::load(cli.config.as_ref());
    let config_log_level = config.as_ref().ok().and_then(|c| c.log_level.clone());
    if let Err(e) = setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()) {
        eprintln!("{} {:?}", "✗".red(), e);
    }

    if let Ok(config) = &config {
        for message in &config.skipped {
            warn!("{}", message);
        }
        match &config.source {
            Some(path) => info!("Loaded config from: {}", path.display()),
            None => info!("No config file found, using defaults"),
        }
    }

    info!(command_file = %cli.command_file.display(), hosts = ?cli.hosts, "slotdispatch starting");

    match run(cli, config).await {
        Ok(RunOutcome::Drained { ticks }) => {
            println!("{} All commands dispatched after {} ticks", "✓".green(), ticks);
            ExitCode::from(EXIT_OK)
        }
        Ok(RunOutcome::Cancelled { ticks, remaining }) => {
            println!(
                "{} Cancelled after {} ticks, {} commands not dispatched",
                "✗".yellow(),
                ticks,
                remaining
            );
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            eprintln!("{} {:?}", "✗".red(), e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
