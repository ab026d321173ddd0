//! SlotDispatch - push queued shell commands onto remote hosts
//!
//! Reads shell commands from a flat file, keeps a fixed table of worker hosts
//! with a slot count each, and once per tick hands one queued command to every
//! host that reports fewer running tasks than it has slots. Runs until the
//! queue is empty.
//!
//! # Flow
//!
//! ```text
//! tick 0 ──► reload? ──► for each host: status ──► free slot? ──► launch
//!   ▲          (every N ticks)                                     │
//!   └──────────── wait interval ◄──── queue empty? ── no ◄─────────┘
//!                                          │ yes
//!                                          ▼
//!                                        done
//! ```
//!
//! # Modules
//!
//! - [`hosts`] - host spec parsing and the host table
//! - [`queue`] - command queue and command file reload
//! - [`status`] - running-task counts from the status tool
//! - [`launcher`] - detached remote launches
//! - [`dispatcher`] - the tick loop
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hosts;
pub mod launcher;
pub mod queue;
pub mod shutdown;
pub mod status;

pub use config::{Config, DispatchConfig, RemoteConfig};
pub use dispatcher::{DispatchState, Dispatcher, HostOutcome, HostReport, RunOutcome, TickReport};
pub use error::DispatchError;
pub use hosts::{Host, HostTable};
pub use launcher::{Launcher, ShellLauncher};
pub use queue::CommandQueue;
pub use status::{CommandStatusProbe, StatusProbe, parse_running_count};
