//! Running-task counts from the external status tool

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::DispatchError;

/// Lines the status tool prints around the task listing
const STATUS_FRAME_LINES: usize = 2;

/// Lines the status tool prints per running task
const STATUS_LINES_PER_TASK: usize = 2;

/// Number of tasks currently executing on a host
///
/// Answers are always fetched fresh; implementations must not cache them.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn running_count(&self, host: &str) -> Result<usize, DispatchError>;
}

/// Derive the running-task count from the status tool's report
///
/// The report is a two-line frame with two lines per task, so the count is
/// `(lines - 2) / 2` where `lines` counts the `\n`-separated segments.
///
/// A report shorter than the frame (empty or a single line) returns `None`
/// instead of counting as zero tasks. A status tool that printed nothing
/// useful must not make a host look idle.
pub fn parse_running_count(report: &str) -> Option<usize> {
    let lines = report.split('\n').count();
    lines
        .checked_sub(STATUS_FRAME_LINES)
        .map(|body| body / STATUS_LINES_PER_TASK)
}

/// Status probe that runs a local program with the host as its last argument
///
/// With the defaults this runs `wrexp ps <host>`.
#[derive(Debug, Clone)]
pub struct CommandStatusProbe {
    program: String,
    args: Vec<String>,
}

impl CommandStatusProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl StatusProbe for CommandStatusProbe {
    async fn running_count(&self, host: &str) -> Result<usize, DispatchError> {
        debug!(%host, program = %self.program, "CommandStatusProbe::running_count: called");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DispatchError::external(host, format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DispatchError::external(
                host,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }

        let report = String::from_utf8(output.stdout)
            .map_err(|_| DispatchError::external(host, "status output is not valid UTF-8"))?;

        parse_running_count(&report).ok_or_else(|| {
            DispatchError::external(host, format!("unrecognised status output: {:?}", report))
        })
    }
}
