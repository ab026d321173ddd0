//! Command queue fed from a flat text file

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::DispatchError;

/// Commands waiting for a host
///
/// Commands are taken from the end that was loaded last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandQueue {
    commands: Vec<String>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append one command at the newest end
    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    /// Take the most recently loaded command
    pub fn pop(&mut self) -> Option<String> {
        self.commands.pop()
    }

    /// Commands in load order, oldest first
    pub fn as_slice(&self) -> &[String] {
        &self.commands
    }

    /// Append every non-blank line of `path`, then truncate the file
    ///
    /// Returns the number of commands added. Lines are stripped of trailing
    /// whitespace. Anything written to the file after the truncate is picked up
    /// by the next reload. The queue only changes once both the read and the
    /// truncate succeeded; on error the queue and the file are left as they were.
    pub fn reload(&mut self, path: &Path) -> Result<usize, DispatchError> {
        debug!(path = %path.display(), "CommandQueue::reload: called");
        let content = fs::read_to_string(path).map_err(|e| DispatchError::io(path, e))?;

        let loaded: Vec<String> = content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        fs::File::create(path).map_err(|e| DispatchError::io(path, e))?;

        let added = loaded.len();
        self.commands.extend(loaded);

        info!(path = %path.display(), added, total = self.commands.len(), "Reloaded command file");
        Ok(added)
    }
}

impl<S: Into<String>> FromIterator<S> for CommandQueue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().map(Into::into).collect(),
        }
    }
}
