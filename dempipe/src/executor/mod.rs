//! Task execution: queue, workers, completion ledger and supervisor.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────┐  Split
//!   targets ───────► │  Supervisor  │ ───────────────┐
//!                    └──────────────┘                ▼
//!                                            ┌──────────────┐
//!            ┌─────────────────────────────► │  TaskQueue   │ ◄──────────┐
//!            │ follow-on tasks               └──────────────┘            │
//!            │                                      │ pop_timeout        │ Merge
//!    ┌───────────────┐  route   ┌───────────────┐   │            ┌───────────────┐
//!    │    Router     │ ◄─────── │  WorkerPool   │ ◄─┘            │  LedgerActor  │
//!    └───────────────┘          └───────────────┘ ─────────────► └───────────────┘
//!                                                  Completion
//! ```
//!
//! Workers are OS threads; the supervisor and the ledger actor run on the
//! tokio runtime. All three stop on the shared [`CancellationToken`].
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod ledger;
mod pool;
mod queue;
mod router;
mod supervisor;
mod task;

pub use ledger::{CompletionLedger, CompletionSender, LedgerActor};
pub use pool::{PoolConfig, WorkerPool, WorkerShared, DEFAULT_IDLE_TIMEOUT, DEFAULT_TASK_PAUSE};
pub use queue::{QueuedTask, TaskQueue};
pub use router::Router;
pub use supervisor::{
    CycleReport, Supervisor, SupervisorConfig, DEFAULT_REPLENISH_INTERVAL,
    DEFAULT_SUPERVISOR_PERIOD,
};
pub use task::{BranchKey, Completion, Outcome, Task, TaskError, TaskErrorKind, TaskKind};
