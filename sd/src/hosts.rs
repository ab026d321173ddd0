//! Host table built from `host:slots` specs

use std::fmt;

use tracing::debug;

use crate::error::DispatchError;

/// A worker host and the number of tasks it may run at once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub slots: usize,
}

impl Host {
    /// Parse a single `host:slots` spec
    pub fn parse(spec: &str) -> Result<Self, DispatchError> {
        debug!(%spec, "Host::parse: called");
        let Some((name, slots)) = spec.split_once(':') else {
            return Err(DispatchError::config(format!(
                "host spec '{}' is missing ':' (expected host:slots)",
                spec
            )));
        };

        if name.is_empty() {
            return Err(DispatchError::config(format!("host spec '{}' has an empty host name", spec)));
        }

        let slots = slots.parse::<usize>().map_err(|e| {
            DispatchError::config(format!(
                "host spec '{}' has invalid slot count '{}': {}",
                spec, slots, e
            ))
        })?;

        Ok(Self {
            name: name.to_string(),
            slots,
        })
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.slots, self.name)
    }
}

/// Fixed set of hosts, in the order they were first named
///
/// Built once at startup and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostTable {
    hosts: Vec<Host>,
}

impl HostTable {
    /// Build the table from `host:slots` specs
    ///
    /// A host named twice keeps its first position but takes the last slot count.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, DispatchError> {
        debug!(count = specs.len(), "HostTable::from_specs: called");
        let mut hosts: Vec<Host> = Vec::with_capacity(specs.len());

        for spec in specs {
            let host = Host::parse(spec.as_ref())?;
            match hosts.iter_mut().find(|h| h.name == host.name) {
                Some(existing) => {
                    debug!(host = %host.name, old = existing.slots, new = host.slots, "HostTable::from_specs: overriding slots");
                    existing.slots = host.slots;
                }
                None => hosts.push(host),
            }
        }

        Ok(Self { hosts })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    /// Startup summary: host count, a header, then one `slots\thost` row per host
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.hosts.len() + 2);
        lines.push(format!("Initialising {} hosts:", self.hosts.len()));
        lines.push("slots\thost".to_string());
        lines.extend(self.hosts.iter().map(Host::to_string));
        lines
    }
}
