//! Supervisor loop.
//!
//! Every period the supervisor
//!
//! 1. replenishes the queue with Split tasks for target tiles that have
//!    not been started, at most one per worker per cycle, when the queue
//!    holds fewer tasks than there are workers and the replenish interval
//!    has passed (the first cycle always replenishes);
//! 2. logs a telemetry snapshot and any stalled branches;
//! 3. optionally cancels the shutdown token once every target has been
//!    dispatched and no work is left anywhere.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::queue::TaskQueue;
use super::task::Task;
use crate::telemetry::{PipelineMetrics, StalledRegistry, TelemetrySnapshot};
use crate::tile::{TileGraph, TileId};

/// Default supervisor period.
pub const DEFAULT_SUPERVISOR_PERIOD: Duration = Duration::from_secs(60);

/// Default minimum time between replenishments.
pub const DEFAULT_REPLENISH_INTERVAL: Duration = Duration::from_secs(3600);

/// Supervisor settings.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub worker_count: usize,
    pub period: Duration,
    pub replenish_interval: Duration,
    /// Cancel the shutdown token once all work is done.
    pub exit_when_drained: bool,
}

impl SupervisorConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            period: DEFAULT_SUPERVISOR_PERIOD,
            replenish_interval: DEFAULT_REPLENISH_INTERVAL,
            exit_when_drained: false,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_replenish_interval(mut self, interval: Duration) -> Self {
        self.replenish_interval = interval;
        self
    }

    pub fn with_exit_when_drained(mut self, exit: bool) -> Self {
        self.exit_when_drained = exit;
        self
    }
}

/// Result of one supervisor cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub dispatched: usize,
    pub drained: bool,
    pub snapshot: TelemetrySnapshot,
}

/// Feeds target tiles into the queue and reports progress.
pub struct Supervisor {
    config: SupervisorConfig,
    queue: Arc<TaskQueue>,
    metrics: Arc<PipelineMetrics>,
    stalled: Arc<StalledRegistry>,
    pending: VecDeque<TileId>,
    started: HashSet<TileId>,
    last_replenish: Option<Instant>,
}

impl Supervisor {
    /// Creates a supervisor for `targets`.
    ///
    /// Targets missing from `graph` are dropped with a warning.
    pub fn new(
        config: SupervisorConfig,
        targets: Vec<TileId>,
        graph: &TileGraph,
        queue: Arc<TaskQueue>,
        metrics: Arc<PipelineMetrics>,
        stalled: Arc<StalledRegistry>,
    ) -> Self {
        let mut pending = VecDeque::with_capacity(targets.len());
        for target in targets {
            if graph.contains(&target) {
                pending.push_back(target);
            } else {
                warn!(tile = %target, "Target not in tile index, skipping");
            }
        }
        Self {
            config,
            queue,
            metrics,
            stalled,
            pending,
            started: HashSet::new(),
            last_replenish: None,
        }
    }

    /// Targets not yet dispatched.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Runs cycles until shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> TelemetrySnapshot {
        info!(
            targets = self.pending.len(),
            workers = self.config.worker_count,
            period_secs = self.config.period.as_secs(),
            "Supervisor starting"
        );
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Supervisor shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.cycle(Instant::now());
                    if report.drained && self.config.exit_when_drained {
                        info!(
                            finished = report.snapshot.products_finished(),
                            stalled = report.snapshot.stalled,
                            "All work done"
                        );
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }

        self.snapshot()
    }

    /// One supervisor cycle at time `now`.
    pub fn cycle(&mut self, now: Instant) -> CycleReport {
        let due = self
            .last_replenish
            .map_or(true, |last| now.duration_since(last) > self.config.replenish_interval);

        let mut dispatched = 0;
        if due && self.queue.len() < self.config.worker_count {
            dispatched = self.replenish();
            self.last_replenish = Some(now);
        }

        let snapshot = self.snapshot();
        let drained = self.pending.is_empty() && self.queue.outstanding() == 0;

        info!(
            dispatched,
            remaining = self.pending.len(),
            queue = snapshot.queue_depth,
            in_progress = snapshot.in_progress,
            completed = %snapshot.completed,
            failed = snapshot.failed.total(),
            stalled = snapshot.stalled,
            uptime = %snapshot.uptime_human(),
            "Supervisor cycle"
        );
        for branch in self.stalled.list() {
            warn!(
                branch = %branch.branch,
                since = %branch.at.format("%Y-%m-%d %H:%M:%S"),
                reason = %branch.reason,
                "Stalled branch"
            );
        }

        CycleReport {
            dispatched,
            drained,
            snapshot,
        }
    }

    fn replenish(&mut self) -> usize {
        let mut dispatched = 0;
        while dispatched < self.config.worker_count {
            let Some(tile) = self.pending.pop_front() else {
                break;
            };
            if !self.started.insert(tile.clone()) {
                continue;
            }
            info!(tile = %tile, "Scheduling split");
            self.queue.push(Task::Split { tile });
            dispatched += 1;
        }
        dispatched
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        self.metrics.snapshot(self.queue.len(), self.stalled.len())
    }
}
