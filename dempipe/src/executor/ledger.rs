//! Completion ledger and the actor that owns it.
//!
//! Workers never touch the ledger. They send a [`Completion`] over an
//! unbounded channel; the [`LedgerActor`] records it and, when a
//! (tile, product) entry holds every sub-tile, removes the entry and
//! enqueues its Merge task in the same step.
//!
//! ```text
//! worker ──Completion──► LedgerActor ──► CompletionLedger::record
//!                                             │ rows×cols reached
//!                                             ▼
//!                                        TaskQueue::push(Merge)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::TaskQueue;
use super::task::{Completion, Task};
use crate::telemetry::PipelineMetrics;
use crate::tile::{Product, Tile, TileId};

/// Completed sub-tiles per (parent, product).
#[derive(Debug)]
pub struct CompletionLedger {
    expected: usize,
    entries: HashMap<(TileId, Product), Vec<Tile>>,
}

impl CompletionLedger {
    /// Ledger for parents with `expected` sub-tiles each.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            entries: HashMap::new(),
        }
    }

    /// Records one completion.
    ///
    /// Returns the Merge task when this completion fills the entry; the
    /// entry is removed at that moment.
    pub fn record(&mut self, completion: Completion) -> Option<Task> {
        let key = (completion.parent, completion.product);
        let children = self.entries.entry(key.clone()).or_default();

        if children
            .iter()
            .any(|c| c.id() == completion.subtile.id())
        {
            warn!(subtile = %completion.subtile.id(), product = %key.1, "Duplicate completion ignored");
            return None;
        }
        children.push(completion.subtile);

        if children.len() < self.expected {
            return None;
        }
        let children = self.entries.remove(&key)?;
        let (tile, product) = key;
        Some(Task::Merge {
            tile,
            product,
            children,
        })
    }

    /// Completions held for (tile, product).
    pub fn count(&self, tile: &TileId, product: Product) -> usize {
        self.entries
            .get(&(tile.clone(), product))
            .map_or(0, Vec::len)
    }

    /// Number of open entries.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}

/// Sender half handed to workers.
pub type CompletionSender = mpsc::UnboundedSender<Completion>;

/// Owns the ledger and turns completions into Merge tasks.
pub struct LedgerActor {
    ledger: CompletionLedger,
    completions: mpsc::UnboundedReceiver<Completion>,
    queue: Arc<TaskQueue>,
    metrics: Arc<PipelineMetrics>,
}

impl LedgerActor {
    /// Creates the actor and the sender workers report to.
    pub fn new(
        expected: usize,
        queue: Arc<TaskQueue>,
        metrics: Arc<PipelineMetrics>,
    ) -> (Self, CompletionSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Self {
            ledger: CompletionLedger::new(expected),
            completions: rx,
            queue,
            metrics,
        };
        (actor, tx)
    }

    /// Processes completions until shutdown or until every sender is gone.
    ///
    /// Returns the ledger so callers can inspect what was left open.
    pub async fn run(mut self, shutdown: CancellationToken) -> CompletionLedger {
        info!(expected = self.ledger.expected(), "Ledger actor starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Ledger actor shutting down");
                    break;
                }

                completion = self.completions.recv() => {
                    match completion {
                        Some(completion) => self.handle(completion),
                        None => {
                            debug!("Completion channel closed");
                            break;
                        }
                    }
                }
            }
        }

        if self.ledger.pending() > 0 {
            warn!(open_entries = self.ledger.pending(), "Ledger stopped with incomplete tiles");
        }
        self.ledger
    }

    fn handle(&mut self, completion: Completion) {
        let parent = completion.parent.clone();
        let product = completion.product;

        if let Some(merge) = self.ledger.record(completion) {
            info!(tile = %parent, product = %product, "All sub-tiles interpolated, scheduling merge");
            self.queue.push(merge);
            self.metrics.merge_emitted();
        } else {
            debug!(
                tile = %parent,
                product = %product,
                done = self.ledger.count(&parent, product),
                expected = self.ledger.expected(),
                "Recorded completion"
            );
        }
        self.metrics.notice_processed();
        self.queue.task_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, Rect};
    use std::path::PathBuf;

    fn completion(parent: &str, index: usize, product: Product) -> Completion {
        let parent = TileId::new(parent);
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        Completion {
            subtile: Tile::subtile(&parent, index, rect, rect, PathBuf::from("x.LAS")),
            parent,
            product,
        }
    }

    #[test]
    fn test_merge_only_when_full() {
        let mut ledger = CompletionLedger::new(4);
        for i in 1..=3 {
            assert!(ledger.record(completion("A", i, Product::Dtm)).is_none());
        }
        assert_eq!(ledger.count(&TileId::new("A"), Product::Dtm), 3);

        let merge = ledger.record(completion("A", 4, Product::Dtm)).unwrap();
        match merge {
            Task::Merge {
                tile,
                product,
                children,
            } => {
                assert_eq!(tile.as_str(), "A");
                assert_eq!(product, Product::Dtm);
                assert_eq!(children.len(), 4);
            }
            other => panic!("unexpected task {other}"),
        }
        assert_eq!(ledger.pending(), 0);
    }

    #[test]
    fn test_products_are_separate_entries() {
        let mut ledger = CompletionLedger::new(2);
        assert!(ledger.record(completion("A", 1, Product::Dtm)).is_none());
        assert!(ledger.record(completion("A", 1, Product::Dsm)).is_none());
        assert!(ledger.record(completion("A", 2, Product::Dsm)).is_some());
        assert_eq!(ledger.count(&TileId::new("A"), Product::Dtm), 1);
        assert_eq!(ledger.pending(), 1);
    }

    #[test]
    fn test_duplicate_completion_does_not_count() {
        let mut ledger = CompletionLedger::new(2);
        assert!(ledger.record(completion("A", 1, Product::Dtm)).is_none());
        assert!(ledger.record(completion("A", 1, Product::Dtm)).is_none());
        assert_eq!(ledger.count(&TileId::new("A"), Product::Dtm), 1);
    }

    #[tokio::test]
    async fn test_actor_enqueues_exactly_one_merge() {
        let queue = Arc::new(TaskQueue::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let (actor, tx) = LedgerActor::new(2, Arc::clone(&queue), Arc::clone(&metrics));
        let handle = tokio::spawn(actor.run(CancellationToken::new()));

        for i in 1..=2 {
            queue.hold();
            metrics.notice_sent();
            tx.send(completion("B", i, Product::Dsm)).unwrap();
        }
        drop(tx);
        let ledger = handle.await.unwrap();

        assert_eq!(queue.len(), 1);
        assert!(matches!(queue.try_pop().unwrap().task, Task::Merge { .. }));
        assert_eq!(ledger.pending(), 0);
        assert_eq!(metrics.notices_pending(), 0);
        assert_eq!(queue.outstanding(), 1);
    }
}
