//! Lock-free pipeline counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use super::snapshot::{KindCounts, TelemetrySnapshot};
use crate::executor::TaskKind;

const KINDS: usize = TaskKind::ALL.len();

/// Counters shared by workers, the ledger actor and the supervisor.
///
/// All updates use relaxed ordering; the values are for reporting only.
#[derive(Debug)]
pub struct PipelineMetrics {
    started: [AtomicU64; KINDS],
    completed: [AtomicU64; KINDS],
    failed: [AtomicU64; KINDS],
    in_progress: AtomicUsize,
    empty_inputs: AtomicU64,
    notices_sent: AtomicU64,
    notices_processed: AtomicU64,
    merges_emitted: AtomicU64,
    created_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            started: Default::default(),
            completed: Default::default(),
            failed: Default::default(),
            in_progress: AtomicUsize::new(0),
            empty_inputs: AtomicU64::new(0),
            notices_sent: AtomicU64::new(0),
            notices_processed: AtomicU64::new(0),
            merges_emitted: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    // -------------------------------------------------------------------------
    // Task lifecycle
    // -------------------------------------------------------------------------

    pub fn task_started(&self, kind: TaskKind) {
        self.started[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.in_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_completed(&self, kind: TaskKind) {
        self.completed[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.in_progress.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn task_failed(&self, kind: TaskKind) {
        self.failed[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.in_progress.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::Relaxed)
    }

    pub fn empty_input(&self) {
        self.empty_inputs.fetch_add(1, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Ledger
    // -------------------------------------------------------------------------

    pub fn notice_sent(&self) {
        self.notices_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notice_processed(&self) {
        self.notices_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Completion notices sent but not yet handled by the ledger actor.
    pub fn notices_pending(&self) -> u64 {
        let sent = self.notices_sent.load(Ordering::Relaxed);
        sent.saturating_sub(self.notices_processed.load(Ordering::Relaxed))
    }

    pub fn merge_emitted(&self) {
        self.merges_emitted.fetch_add(1, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self, queue_depth: usize, stalled: usize) -> TelemetrySnapshot {
        let load = |counters: &[AtomicU64; KINDS]| {
            let mut counts = KindCounts::default();
            for kind in TaskKind::ALL {
                counts.set(kind, counters[kind.index()].load(Ordering::Relaxed));
            }
            counts
        };
        TelemetrySnapshot {
            started: load(&self.started),
            completed: load(&self.completed),
            failed: load(&self.failed),
            in_progress: self.in_progress(),
            queue_depth,
            stalled,
            empty_inputs: self.empty_inputs.load(Ordering::Relaxed),
            merges_emitted: self.merges_emitted.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
        }
    }
}
