//! Detached remote execution of dispatched commands

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::DispatchError;

/// Starts a command on a remote host without waiting for it
///
/// `Ok` means the launch was accepted locally, nothing more. Whether the
/// command actually runs is only visible through a later status query.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, host: &str, command: &str) -> Result<(), DispatchError>;
}

/// Remote command line for a detached run
pub fn remote_command_line(command: &str) -> String {
    format!("nohup {} &", command)
}

/// Launcher that spawns `<program> <host> "nohup <command> &"` and lets it run
///
/// With the defaults this is `ssh`.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    program: String,
}

impl ShellLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Launcher for ShellLauncher {
    async fn launch(&self, host: &str, command: &str) -> Result<(), DispatchError> {
        let remote = remote_command_line(command);
        debug!(%host, %remote, program = %self.program, "ShellLauncher::launch: called");

        // Dropping the child leaves it running; tokio reaps it in the background
        let child = Command::new(&self.program)
            .arg(host)
            .arg(&remote)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| DispatchError::launch(host, format!("failed to spawn {}: {}", self.program, e)))?;

        debug!(%host, pid = ?child.id(), "ShellLauncher::launch: spawned");
        Ok(())
    }
}
