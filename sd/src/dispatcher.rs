//! The dispatch loop
//!
//! One `Dispatcher` owns the host table and the command queue. Each tick it
//! asks every host how many tasks it runs and hands at most one queued command
//! to each host that has a free slot. The loop ends as soon as a tick leaves
//! the queue empty.

use std::path::PathBuf;
use std::sync::Arc;

use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::hosts::{Host, HostTable};
use crate::launcher::Launcher;
use crate::queue::CommandQueue;
use crate::status::StatusProbe;

/// Loop state after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Commands remain; wait and tick again
    Polling,
    /// Queue drained
    Done,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The queue drained after `ticks` ticks
    Drained { ticks: u64 },
    /// Cancelled while waiting between ticks
    Cancelled { ticks: u64, remaining: usize },
}

/// What happened to one host during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutcome {
    /// A command was launched on the host
    Dispatched { command: String },
    /// Every slot is taken
    Full,
    /// Nothing left to hand out
    QueueEmpty,
    /// The status query failed; host skipped this tick
    StatusFailed { error: String },
    /// The launch could not be started
    LaunchFailed { command: String, requeued: bool, error: String },
}

/// One host's line in a tick report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub host: String,
    pub slots: usize,
    pub running: Option<usize>,
    pub outcome: HostOutcome,
}

/// Everything a single tick did, in host table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub reloaded: Option<usize>,
    pub hosts: Vec<HostReport>,
}

impl TickReport {
    /// Commands launched during the tick
    pub fn dispatched(&self) -> Vec<(&str, &str)> {
        self.hosts
            .iter()
            .filter_map(|r| match &r.outcome {
                HostOutcome::Dispatched { command } => Some((r.host.as_str(), command.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Owns the hosts and the queue and drives the dispatch loop
pub struct Dispatcher {
    hosts: HostTable,
    queue: CommandQueue,
    command_file: PathBuf,
    config: DispatchConfig,
    probe: Arc<dyn StatusProbe>,
    launcher: Arc<dyn Launcher>,
    tick: u64,
}

impl Dispatcher {
    /// Create a dispatcher with an empty queue
    pub fn new(
        hosts: HostTable,
        command_file: impl Into<PathBuf>,
        config: DispatchConfig,
        probe: Arc<dyn StatusProbe>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let command_file = command_file.into();
        debug!(hosts = hosts.len(), command_file = %command_file.display(), ?config, "Dispatcher::new: called");
        Self {
            hosts,
            queue: CommandQueue::new(),
            command_file,
            config,
            probe,
            launcher,
            tick: 0,
        }
    }

    /// Replace the queue, e.g. to resume from known commands
    pub fn with_queue(mut self, queue: CommandQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Move new commands from the command file into the queue
    ///
    /// A failure leaves both the queue and the file as they were and must
    /// stop the loop.
    pub fn reload_queue(&mut self) -> Result<usize, DispatchError> {
        debug!(tick = self.tick, "Dispatcher::reload_queue: called");
        println!("Reading commands from {}", self.command_file.display());
        let added = self.queue.reload(&self.command_file)?;
        println!("{} commands found", self.queue.len());
        Ok(added)
    }

    /// Fresh running-task count for one host
    pub async fn query_running_count(&self, host: &str) -> Result<usize, DispatchError> {
        self.probe.running_count(host).await
    }

    /// Offer one queued command to every host with a free slot
    ///
    /// Per-host failures are reported and skipped; this never fails as a whole.
    pub async fn dispatch_tick(&mut self) -> TickReport {
        debug!(tick = self.tick, queued = self.queue.len(), "Dispatcher::dispatch_tick: called");
        let hosts: Vec<Host> = self.hosts.iter().cloned().collect();
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        for host in hosts {
            let host_report = self.dispatch_host(&host).await;
            report.hosts.push(host_report);
        }

        report
    }

    async fn dispatch_host(&mut self, host: &Host) -> HostReport {
        let running = match self.query_running_count(&host.name).await {
            Ok(running) => running,
            Err(e) => {
                warn!(host = %host.name, error = %e, "Skipping host this tick");
                println!("{} [?/{}] {}", host.name, host.slots, e.to_string().yellow());
                return HostReport {
                    host: host.name.clone(),
                    slots: host.slots,
                    running: None,
                    outcome: HostOutcome::StatusFailed { error: e.to_string() },
                };
            }
        };

        println!("{} [{}/{}]", host.name, running, host.slots);
        let mut report = HostReport {
            host: host.name.clone(),
            slots: host.slots,
            running: Some(running),
            outcome: HostOutcome::Full,
        };

        if running >= host.slots {
            debug!(host = %host.name, running, slots = host.slots, "Dispatcher::dispatch_host: no free slot");
            return report;
        }

        let Some(command) = self.queue.pop() else {
            report.outcome = HostOutcome::QueueEmpty;
            return report;
        };

        println!("\tDeploying {} on {}", command.cyan(), host.name);
        let launched = self.launcher.launch(&host.name, &command).await;
        report.outcome = match launched {
            Ok(()) => {
                info!(host = %host.name, %command, remaining = self.queue.len(), "Dispatched command");
                println!("\t{} tasks remaining", self.queue.len());
                HostOutcome::Dispatched { command }
            }
            Err(e) => {
                let requeued = self.config.requeue_on_launch_failure;
                warn!(host = %host.name, %command, requeued, error = %e, "Launch failed");
                println!("\t{} {}", "✗".red(), e);
                let error = e.to_string();
                if requeued {
                    self.queue.push(command.clone());
                } else {
                    println!("\t{} dropped: {}", "✗".red(), command);
                }
                HostOutcome::LaunchFailed {
                    command,
                    requeued,
                    error,
                }
            }
        };

        report
    }

    /// Run one tick: reload when due, dispatch, then report the new state
    ///
    /// Does not wait; the caller sleeps between ticks. The tick counter only
    /// advances when the tick completes.
    pub async fn step(&mut self) -> Result<(DispatchState, TickReport), DispatchError> {
        debug!(tick = self.tick, "Dispatcher::step: called");
        let reloaded = if self.config.is_reload_tick(self.tick) {
            Some(self.reload_queue()?)
        } else {
            None
        };

        let mut report = self.dispatch_tick().await;
        report.reloaded = reloaded;

        let state = if self.queue.is_empty() {
            DispatchState::Done
        } else {
            DispatchState::Polling
        };
        debug!(tick = self.tick, ?state, "Dispatcher::step: tick finished");
        self.tick += 1;
        Ok((state, report))
    }

    /// Tick until the queue drains or `cancel` fires
    ///
    /// Cancellation is only observed while waiting between ticks. An I/O error
    /// on the command file ends the run with that error.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunOutcome, DispatchError> {
        info!(
            hosts = self.hosts.len(),
            interval_secs = self.config.tick_interval_secs,
            reload_every = self.config.reload_every,
            "Dispatcher started"
        );

        loop {
            let (state, _report) = self.step().await?;
            let ticks = self.tick;

            if state == DispatchState::Done {
                info!(ticks, "Queue drained");
                return Ok(RunOutcome::Drained { ticks });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(ticks, remaining = self.queue.len(), "Dispatcher cancelled");
                    return Ok(RunOutcome::Cancelled {
                        ticks,
                        remaining: self.queue.len(),
                    });
                }
                _ = tokio::time::sleep(self.config.tick_interval()) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::mock::MockLauncher;
    use crate::status::mock::MockStatusProbe;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        file: PathBuf,
        probe: Arc<MockStatusProbe>,
        launcher: Arc<MockLauncher>,
    }

    impl Harness {
        fn new(counts: &[(&str, usize)], launcher: MockLauncher) -> Self {
            let temp = TempDir::new().unwrap();
            let file = temp.path().join("commands.txt");
            fs::write(&file, "").unwrap();
            Self {
                _temp: temp,
                file,
                probe: Arc::new(MockStatusProbe::new(counts)),
                launcher: Arc::new(launcher),
            }
        }

        fn dispatcher(&self, specs: &[&str], config: DispatchConfig) -> Dispatcher {
            Dispatcher::new(
                HostTable::from_specs(specs).unwrap(),
                &self.file,
                config,
                self.probe.clone(),
                self.launcher.clone(),
            )
        }
    }

    fn queue(commands: &[&str]) -> CommandQueue {
        commands.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_zero_slot_host_never_eligible() {
        let h = Harness::new(&[("h1", 0), ("h2", 0)], MockLauncher::new());
        let mut d = h
            .dispatcher(&["h1:2", "h2:0"], DispatchConfig::default())
            .with_queue(queue(&["jobA", "jobB", "jobC"]));

        let report = d.dispatch_tick().await;

        assert_eq!(report.dispatched(), vec![("h1", "jobC")]);
        assert_eq!(report.hosts[1].outcome, HostOutcome::Full);
        assert_eq!(d.queue().as_slice(), ["jobA", "jobB"]);
        assert_eq!(h.launcher.launched(), vec![("h1".to_string(), "jobC".to_string())]);
    }

    #[tokio::test]
    async fn test_one_command_per_host_per_tick() {
        let h = Harness::new(&[("big", 0), ("small", 0)], MockLauncher::new());
        let mut d = h
            .dispatcher(&["big:10", "small:1"], DispatchConfig::default())
            .with_queue(queue(&["a", "b", "c", "d"]));

        let report = d.dispatch_tick().await;

        assert_eq!(report.dispatched(), vec![("big", "d"), ("small", "c")]);
        assert_eq!(d.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_busy_host_is_skipped() {
        let h = Harness::new(&[("h1", 2), ("h2", 1)], MockLauncher::new());
        let mut d = h
            .dispatcher(&["h1:2", "h2:2"], DispatchConfig::default())
            .with_queue(queue(&["a", "b"]));

        let report = d.dispatch_tick().await;

        assert_eq!(report.hosts[0].outcome, HostOutcome::Full);
        assert_eq!(report.hosts[0].running, Some(2));
        assert_eq!(report.dispatched(), vec![("h2", "b")]);
    }

    #[tokio::test]
    async fn test_empty_queue_dispatches_nothing() {
        let h = Harness::new(&[("h1", 0)], MockLauncher::new());
        let mut d = h.dispatcher(&["h1:4"], DispatchConfig::default());

        let report = d.dispatch_tick().await;

        assert_eq!(report.hosts[0].outcome, HostOutcome::QueueEmpty);
        assert!(h.launcher.launched().is_empty());
        // Hosts are still polled
        assert_eq!(h.probe.queries(), vec!["h1"]);
    }

    #[tokio::test]
    async fn test_status_failure_skips_only_that_host() {
        // No answer scripted for "down"
        let h = Harness::new(&[("up", 0)], MockLauncher::new());
        let mut d = h
            .dispatcher(&["down:3", "up:3"], DispatchConfig::default())
            .with_queue(queue(&["a", "b"]));

        let report = d.dispatch_tick().await;

        assert!(matches!(report.hosts[0].outcome, HostOutcome::StatusFailed { .. }));
        assert_eq!(report.hosts[0].running, None);
        assert_eq!(report.dispatched(), vec![("up", "b")]);
        assert_eq!(d.queue().as_slice(), ["a"]);
    }

    #[tokio::test]
    async fn test_launch_failure_requeues_by_default() {
        let h = Harness::new(&[("bad", 0), ("good", 0)], MockLauncher::failing_on(&["bad"]));
        let mut d = h
            .dispatcher(&["bad:1", "good:1"], DispatchConfig::default())
            .with_queue(queue(&["a", "b"]));

        let report = d.dispatch_tick().await;

        assert!(matches!(
            report.hosts[0].outcome,
            HostOutcome::LaunchFailed { ref command, requeued: true, .. } if command == "b"
        ));
        // The re-queued command is next in line for the following host
        assert_eq!(report.dispatched(), vec![("good", "b")]);
        assert_eq!(d.queue().as_slice(), ["a"]);
    }

    #[tokio::test]
    async fn test_launch_failure_can_drop_command() {
        let h = Harness::new(&[("bad", 0)], MockLauncher::failing_on(&["bad"]));
        let config = DispatchConfig {
            requeue_on_launch_failure: false,
            ..Default::default()
        };
        let mut d = h.dispatcher(&["bad:1"], config).with_queue(queue(&["a", "b"]));

        let report = d.dispatch_tick().await;

        assert!(matches!(
            report.hosts[0].outcome,
            HostOutcome::LaunchFailed { requeued: false, .. }
        ));
        assert_eq!(d.queue().as_slice(), ["a"]);
    }

    #[tokio::test]
    async fn test_step_reloads_on_tick_zero() {
        let h = Harness::new(&[("h1", 0)], MockLauncher::new());
        fs::write(&h.file, "first\nsecond\n").unwrap();
        let mut d = h.dispatcher(&["h1:1"], DispatchConfig::default());

        let (state, report) = d.step().await.unwrap();

        assert_eq!(report.reloaded, Some(2));
        assert_eq!(report.dispatched(), vec![("h1", "second")]);
        assert_eq!(state, DispatchState::Polling);
        assert_eq!(fs::read_to_string(&h.file).unwrap(), "");
    }

    #[tokio::test]
    async fn test_step_done_when_tick_empties_queue() {
        let h = Harness::new(&[("h1", 0)], MockLauncher::new());
        fs::write(&h.file, "only\n").unwrap();
        let mut d = h.dispatcher(&["h1:1"], DispatchConfig::default());

        let (state, _) = d.step().await.unwrap();
        assert_eq!(state, DispatchState::Done);
    }

    #[tokio::test]
    async fn test_step_reload_failure_is_fatal() {
        let h = Harness::new(&[("h1", 0)], MockLauncher::new());
        let mut d = h.dispatcher(&["h1:1"], DispatchConfig::default());
        fs::remove_file(&h.file).unwrap();

        let err = d.step().await.unwrap_err();
        assert!(matches!(err, DispatchError::Io { .. }));
        // Nothing was dispatched on the failed tick
        assert!(h.probe.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_queue() {
        let h = Harness::new(&[("h1", 0)], MockLauncher::new());
        fs::write(&h.file, "a\nb\nc\n").unwrap();
        let mut d = h.dispatcher(&["h1:1"], DispatchConfig::default());

        let started = tokio::time::Instant::now();
        let outcome = d.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Drained { ticks: 3 });
        assert!(d.queue().is_empty());
        let order: Vec<String> = h.launcher.launched().into_iter().map(|(_, c)| c).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
        // Two waits: no wait after the draining tick
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_picks_up_commands_on_reload_ticks() {
        let h = Harness::new(&[("h1", 0)], MockLauncher::new());
        fs::write(&h.file, "a\nb\nc\n").unwrap();
        let config = DispatchConfig {
            tick_interval_secs: 1,
            reload_every: 2,
            ..Default::default()
        };
        let mut d = h.dispatcher(&["h1:1"], config);

        // Lands between tick 0 and tick 1, read at tick 2
        let file = h.file.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            fs::write(&file, "late\n").unwrap();
        });

        let outcome = d.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Drained { ticks: 4 });
        let order: Vec<String> = h.launcher.launched().into_iter().map(|(_, c)| c).collect();
        assert_eq!(order, vec!["c", "b", "late", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancelled_between_ticks() {
        // Host never has room, so the loop would poll forever
        let h = Harness::new(&[("h1", 4)], MockLauncher::new());
        fs::write(&h.file, "stuck\n").unwrap();
        let mut d = h.dispatcher(&["h1:4"], DispatchConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            trigger.cancel();
        });

        let outcome = d.run(cancel).await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled { ticks: 3, remaining: 1 });
        assert!(h.launcher.launched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_unreadable_command_file() {
        let h = Harness::new(&[("h1", 4)], MockLauncher::new());
        fs::write(&h.file, "stuck\n").unwrap();
        let config = DispatchConfig {
            reload_every: 2,
            ..Default::default()
        };
        let mut d = h.dispatcher(&["h1:4"], config);

        d.step().await.unwrap();
        fs::remove_file(&h.file).unwrap();

        let err = d.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Io { .. }));
        assert_eq!(d.queue().as_slice(), ["stuck"]);
    }
}
