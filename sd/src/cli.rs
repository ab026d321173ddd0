//! CLI argument parsing for slotdispatch

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// SlotDispatch - push queued shell commands onto hosts with free slots
#[derive(Parser, Debug)]
#[command(name = "sd")]
#[command(author, version, about = "Dispatch queued shell commands to remote hosts with free slots", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Seconds between ticks (overrides config)
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Reload the command file every N ticks (overrides config)
    #[arg(long)]
    pub reload_every: Option<u64>,

    /// File of shell commands, one per line; emptied after each read
    #[arg(value_name = "COMMAND_FILE")]
    pub command_file: PathBuf,

    /// Worker hosts as host:slots
    #[arg(value_name = "HOST:SLOTS", required = true)]
    pub hosts: Vec<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(secs) = self.interval_secs {
            config.dispatch.tick_interval_secs = secs;
        }
        if let Some(every) = self.reload_every {
            config.dispatch.reload_every = every;
        }
    }
}
