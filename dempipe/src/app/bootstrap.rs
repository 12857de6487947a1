//! Pipeline bootstrap and lifecycle.
//!
//! Startup order:
//!
//! 1. validate the configuration and discover target tiles;
//! 2. fetch the tile index and build the [`TileGraph`];
//! 3. load the flattening and homogenization polygon layers;
//! 4. start the ledger actor, the worker pool and the supervisor.
//!
//! Shutdown cancels the token, closes the queue so idle workers wake up,
//! joins the workers and waits for the ledger actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::error::AppError;
use crate::config::PipelineConfig;
use crate::executor::{
    LedgerActor, PoolConfig, Router, Supervisor, SupervisorConfig, TaskQueue, WorkerPool,
    WorkerShared, DEFAULT_IDLE_TIMEOUT, DEFAULT_REPLENISH_INTERVAL, DEFAULT_SUPERVISOR_PERIOD,
    DEFAULT_TASK_PAUSE,
};
use crate::index::IndexSource;
use crate::interpolation::FlatteningPolygons;
use crate::pointcloud::{ClassFilter, LasClipper};
use crate::tasks::PipelineContext;
use crate::telemetry::{PipelineMetrics, StalledRegistry, TelemetrySnapshot};
use crate::tile::{discover_targets, Layout, TileGraph, TileId};
use crate::vector::load_polygons;

/// Scheduling knobs that are not part of the configuration file.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub supervisor_period: Duration,
    pub replenish_interval: Duration,
    pub idle_timeout: Duration,
    pub task_pause: Duration,
    /// Stop once every target has been processed.
    pub exit_when_drained: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            supervisor_period: DEFAULT_SUPERVISOR_PERIOD,
            replenish_interval: DEFAULT_REPLENISH_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            task_pause: DEFAULT_TASK_PAUSE,
            exit_when_drained: false,
        }
    }
}

impl RunOptions {
    pub fn with_supervisor_period(mut self, period: Duration) -> Self {
        self.supervisor_period = period;
        self
    }

    pub fn with_replenish_interval(mut self, interval: Duration) -> Self {
        self.replenish_interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_task_pause(mut self, pause: Duration) -> Self {
        self.task_pause = pause;
        self
    }

    pub fn with_exit_when_drained(mut self, exit: bool) -> Self {
        self.exit_when_drained = exit;
        self
    }
}

/// A fully prepared pipeline, ready to run.
///
/// # Example
///
/// ```ignore
/// use dempipe::app::{Pipeline, RunOptions};
/// use dempipe::index::RemoteIndex;
///
/// let pipeline = Pipeline::new(config, &RemoteIndex::new()?)?
///     .with_options(RunOptions::default().with_exit_when_drained(true));
/// let summary = pipeline.run_blocking(shutdown)?;
/// println!("{} products finished", summary.products_finished());
/// ```
pub struct Pipeline {
    context: Arc<PipelineContext>,
    targets: Vec<TileId>,
    options: RunOptions,
}

impl Pipeline {
    /// Prepares a pipeline from configuration and a tile index source.
    pub fn new(config: PipelineConfig, index: &dyn IndexSource) -> Result<Self, AppError> {
        config.validate()?;
        let targets = discover_targets(&config.folders.tiles_to_process)?;
        info!(targets = targets.len(), "Discovered target tiles");

        let footprints = index.fetch()?;
        let layout = Layout::new(config.folders.clone());
        let graph = TileGraph::build(footprints, &layout)?;

        let flattening = FlatteningPolygons::load(&layout)?;
        let homogenization = load_polygons(&layout.homogenization_polygon_dir())?;
        info!(
            water = flattening.water.len(),
            buildings = flattening.buildings.len(),
            homogenization = homogenization.len(),
            "Loaded polygon layers"
        );

        for dir in [&config.folders.processing, &config.folders.finished] {
            std::fs::create_dir_all(dir).map_err(|e| AppError::Config(e.into()))?;
        }

        let context = PipelineContext::new(
            config,
            layout,
            Arc::new(graph),
            Arc::new(ClassFilter),
            Arc::new(LasClipper),
        )
        .with_flattening(flattening)
        .with_homogenization(homogenization);

        Ok(Self::from_parts(context, targets))
    }

    /// Wraps an already built context.
    pub fn from_parts(context: PipelineContext, targets: Vec<TileId>) -> Self {
        Self {
            context: Arc::new(context),
            targets,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn targets(&self) -> &[TileId] {
        &self.targets
    }

    /// Runs until `shutdown` is cancelled, or until all work is done when
    /// [`RunOptions::exit_when_drained`] is set.
    ///
    /// Returns the final telemetry snapshot.
    pub async fn run(self, shutdown: CancellationToken) -> Result<TelemetrySnapshot, AppError> {
        let config = &self.context.config;
        let workers = config.worker_count;
        let expected = config.subtile_count();

        let queue = Arc::new(TaskQueue::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let stalled = Arc::new(StalledRegistry::new());

        let (ledger, completions) =
            LedgerActor::new(expected, Arc::clone(&queue), Arc::clone(&metrics));
        let ledger_handle = tokio::spawn(ledger.run(shutdown.clone()));

        let supervisor = Supervisor::new(
            SupervisorConfig::new(workers)
                .with_period(self.options.supervisor_period)
                .with_replenish_interval(self.options.replenish_interval)
                .with_exit_when_drained(self.options.exit_when_drained),
            self.targets,
            &self.context.graph,
            Arc::clone(&queue),
            Arc::clone(&metrics),
            Arc::clone(&stalled),
        );

        let shared = WorkerShared {
            router: Arc::new(Router::new(Arc::clone(&self.context))),
            queue: Arc::clone(&queue),
            completions,
            metrics: Arc::clone(&metrics),
            stalled: Arc::clone(&stalled),
        };
        let pool_config = PoolConfig::new(workers)
            .with_idle_timeout(self.options.idle_timeout)
            .with_pause(self.options.task_pause);
        let pool = match WorkerPool::spawn(pool_config, shared, shutdown.clone()) {
            Ok(pool) => pool,
            Err(e) => {
                shutdown.cancel();
                queue.close();
                return Err(AppError::WorkerSpawn(e));
            }
        };

        supervisor.run(shutdown.clone()).await;

        shutdown.cancel();
        queue.close();
        if let Err(e) = tokio::task::spawn_blocking(move || pool.join()).await {
            error!(error = %e, "Joining worker pool failed");
        }
        match ledger_handle.await {
            Ok(ledger) if ledger.pending() > 0 => {
                warn!(open = ledger.pending(), "Products left without all sub-tiles");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Ledger actor failed"),
        }

        let snapshot = metrics.snapshot(queue.len(), stalled.len());
        for branch in stalled.list() {
            warn!(branch = %branch.branch, reason = %branch.reason, "Branch did not finish");
        }
        info!(
            finished = snapshot.products_finished(),
            completed = %snapshot.completed,
            failed = snapshot.failed.total(),
            stalled = snapshot.stalled,
            uptime = %snapshot.uptime_human(),
            "Pipeline stopped"
        );
        Ok(snapshot)
    }

    /// Runs on a dedicated multi-threaded runtime.
    pub fn run_blocking(self, shutdown: CancellationToken) -> Result<TelemetrySnapshot, AppError> {
        let runtime = Runtime::new().map_err(AppError::RuntimeCreation)?;
        runtime.block_on(self.run(shutdown))
    }
}
