//! Task queue and routing for the Muster engine.
//!
//! The router owns every task from submission to its terminal state. On
//! submission it computes an integer priority, announces the task on the
//! bus, and immediately tries to hand it to the best-matching team member.
//! Failed tasks are retried with exponential backoff on cancellable timers;
//! tasks stranded by a failed agent are re-routed, and the urgent ones that
//! cannot be placed are escalated to their project's team lead.
//!
//! # Main types
//!
//! - [`TaskRouter`]: the queue and its routing logic
//! - [`TaskSpec`]: submission input
//! - [`QueuedTask`]: a task as the router tracks it
//! - [`RetryPolicy`]: backoff tuning
//! - [`TimerRegistry`]: cancellable per-task timers

/// Retry policy and backoff arithmetic.
pub mod retry;
/// The router itself.
pub mod router;
/// Task records and priority computation.
pub mod task;
/// Cancellable timers keyed by owner.
pub mod timer;

pub use retry::RetryPolicy;
pub use router::{QueueStatus, TaskRouter};
pub use task::{compute_priority, QueuedTask, TaskSpec, TaskStatus};
pub use timer::TimerRegistry;
