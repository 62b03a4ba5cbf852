//! Sweep engine
//!
//! - `decision`: pure threshold and fee arithmetic
//! - `retry`: per-wallet attempt state and backoff
//! - `executor`: a single attempt against the chain adapters
//! - `scheduler`: periodic ticks, in-flight exclusivity and shutdown

pub mod decision;
pub mod executor;
pub mod retry;
pub mod scheduler;

pub use decision::{decide, meets_threshold, SkipReason, SweepDecision};
pub use executor::{AttemptOutcome, SweepExecutor};
pub use retry::{AttemptContext, AttemptState, FailureKind, RetryDirective, RetryPolicy};
pub use scheduler::{Scheduler, TickSummary};
