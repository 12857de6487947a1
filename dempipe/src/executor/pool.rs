//! Fixed pool of worker threads.
//!
//! Each worker is an OS thread running an explicit loop:
//!
//! ```text
//! loop {
//!     shutdown cancelled?         ──► exit
//!     pop_timeout(idle)           ──► None ──► log, retry
//!     in_progress += 1
//!     catch_unwind(router.route)  ──► Ok(FollowOn)  ──► queue.push_all
//!                                 ──► Ok(Completed) ──► hold, ledger channel
//!                                 ──► Err / panic   ──► log, stalled registry
//!     in_progress -= 1, task_done
//!     sleep(pause)
//! }
//! ```
//!
//! Failures never propagate out of a worker and are never retried.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ledger::CompletionSender;
use super::queue::TaskQueue;
use super::router::Router;
use super::task::{Outcome, Task};
use crate::telemetry::{PipelineMetrics, StalledRegistry};

/// Default wait for a task before logging an idle worker.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause after each task.
pub const DEFAULT_TASK_PAUSE: Duration = Duration::from_secs(1);

/// Worker pool settings.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub idle_timeout: Duration,
    pub pause: Duration,
}

impl PoolConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            pause: DEFAULT_TASK_PAUSE,
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// Shared handles every worker needs.
#[derive(Clone)]
pub struct WorkerShared {
    pub router: Arc<Router>,
    pub queue: Arc<TaskQueue>,
    pub completions: CompletionSender,
    pub metrics: Arc<PipelineMetrics>,
    pub stalled: Arc<StalledRegistry>,
}

/// Running worker threads.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `config.worker_count` threads named `worker-01`, `worker-02`, ...
    pub fn spawn(
        config: PoolConfig,
        shared: WorkerShared,
        shutdown: CancellationToken,
    ) -> std::io::Result<Self> {
        let mut handles = Vec::with_capacity(config.worker_count);
        for n in 1..=config.worker_count {
            let worker = Worker {
                shared: shared.clone(),
                idle_timeout: config.idle_timeout,
                pause: config.pause,
                shutdown: shutdown.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("worker-{:02}", n))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }
        info!(workers = handles.len(), "Worker pool started");
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to exit.
    pub fn join(self) {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "Worker thread panicked outside a task");
            }
        }
        info!("Worker pool stopped");
    }
}

struct Worker {
    shared: WorkerShared,
    idle_timeout: Duration,
    pause: Duration,
    shutdown: CancellationToken,
}

impl Worker {
    fn run(self) {
        debug!("Worker started");
        while !self.shutdown.is_cancelled() {
            let Some(queued) = self.shared.queue.pop_timeout(self.idle_timeout) else {
                if !self.shutdown.is_cancelled() && !self.shared.queue.is_closed() {
                    debug!(idle_secs = self.idle_timeout.as_secs(), "No task available, waiting");
                }
                continue;
            };
            debug!(
                task = %queued.task,
                sequence = queued.sequence,
                wait_ms = queued.wait_time().as_millis() as u64,
                "Dequeued task"
            );
            self.execute(queued.task);
            self.shared.queue.task_done();

            if !self.pause.is_zero() && !self.shutdown.is_cancelled() {
                thread::sleep(self.pause);
            }
        }
        debug!("Worker stopped");
    }

    fn execute(&self, task: Task) {
        let shared = &self.shared;
        let kind = task.kind();
        let branch = task.branch();
        let label = task.to_string();
        let started = Instant::now();

        shared.metrics.task_started(kind);
        let result = panic::catch_unwind(AssertUnwindSafe(|| shared.router.route(task)));

        match result {
            Ok(Ok(outcome)) => {
                match outcome {
                    Outcome::FollowOn(tasks) => {
                        debug!(task = %label, follow_on = tasks.len(), "Enqueuing follow-on tasks");
                        shared.queue.push_all(tasks);
                    }
                    Outcome::Completed(completion) => {
                        if !completion.subtile.interpolated {
                            shared.metrics.empty_input();
                        }
                        shared.queue.hold();
                        shared.metrics.notice_sent();
                        if shared.completions.send(completion).is_err() {
                            shared.metrics.notice_processed();
                            shared.queue.task_done();
                            warn!(task = %label, "Ledger gone, completion dropped");
                        }
                    }
                    Outcome::Done => {}
                }
                shared.metrics.task_completed(kind);
                debug!(
                    task = %label,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                );
            }
            Ok(Err(e)) => {
                shared.metrics.task_failed(kind);
                error!(task = %label, error = %e, "Task failed, branch stalled");
                shared.stalled.record(branch, e.to_string());
            }
            Err(payload) => {
                shared.metrics.task_failed(kind);
                let reason = panic_message(payload.as_ref());
                error!(task = %label, panic = %reason, "Task panicked, branch stalled");
                shared.stalled.record(branch, format!("panic: {}", reason));
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("bad cell {}", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad cell 3");
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new(3)
            .with_idle_timeout(Duration::from_millis(10))
            .with_pause(Duration::ZERO);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.idle_timeout, Duration::from_millis(10));
        assert!(config.pause.is_zero());
    }
}
