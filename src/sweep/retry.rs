//! Per-wallet attempt state machine
//!
//! ```text
//! Idle ─▶ Attempting ─┬─▶ Succeeded
//!            ▲        ├─▶ FailedTerminal
//!            │        └─▶ FailedTransient ─(retries left)─▶ wait ─┘
//!            │                      └─(exhausted)─▶ FailedTerminal
//! ```
//!
//! The context is advanced explicitly by the scheduler; time is passed in,
//! so transitions can be checked without timers.

use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, FailureClass};
use crate::wallet::WalletId;

/// Retry limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before re-attempt number `retry_count + 1`: `base * (retry_count + 1)`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.base_delay.saturating_mul(retry_count.saturating_add(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Attempting,
    Succeeded,
    FailedTransient,
    FailedTerminal,
}

/// Classification of the most recent failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Terminal,
    MaxRetriesReached,
}

/// What the scheduler should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDirective {
    RetryAfter(Duration),
    Stop(FailureKind),
}

/// Ephemeral record of one wallet's sweep attempt
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub wallet_id: WalletId,
    pub retry_count: u32,
    pub next_eligible_at: Option<Instant>,
    pub last_failure: Option<FailureKind>,
    pub last_error: Option<String>,
    pub state: AttemptState,
}

impl AttemptContext {
    pub fn new(wallet_id: WalletId) -> Self {
        Self {
            wallet_id,
            retry_count: 0,
            next_eligible_at: None,
            last_failure: None,
            last_error: None,
            state: AttemptState::Idle,
        }
    }

    /// Enter `Attempting`. Only valid from `Idle` or after a transient failure.
    pub fn begin(&mut self) -> bool {
        match self.state {
            AttemptState::Idle | AttemptState::FailedTransient => {
                self.state = AttemptState::Attempting;
                self.next_eligible_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn succeed(&mut self) {
        self.state = AttemptState::Succeeded;
        self.next_eligible_at = None;
    }

    /// Record a failure observed at `now` and decide whether to retry
    pub fn fail(&mut self, error: &Error, policy: &RetryPolicy, now: Instant) -> RetryDirective {
        self.last_error = Some(error.to_string());

        if error.classify() == FailureClass::Terminal {
            self.state = AttemptState::FailedTerminal;
            self.last_failure = Some(FailureKind::Terminal);
            return RetryDirective::Stop(FailureKind::Terminal);
        }

        if self.retry_count >= policy.max_retries {
            self.state = AttemptState::FailedTerminal;
            self.last_failure = Some(FailureKind::MaxRetriesReached);
            return RetryDirective::Stop(FailureKind::MaxRetriesReached);
        }

        let delay = policy.delay_for(self.retry_count);
        self.retry_count += 1;
        self.state = AttemptState::FailedTransient;
        self.last_failure = Some(FailureKind::Transient);
        self.next_eligible_at = Some(now + delay);
        RetryDirective::RetryAfter(delay)
    }

    /// Attempts made so far, including the current one
    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(10))
    }

    fn network() -> Error {
        Error::Network("connection refused".into())
    }

    #[test]
    fn test_delays_strictly_increase() {
        let policy = policy();
        let delays: Vec<_> = (0..5).map(|n| policy.delay_for(n)).collect();
        assert_eq!(delays[0], Duration::from_secs(10));
        assert_eq!(delays[1], Duration::from_secs(20));
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_transient_failures_until_exhausted() {
        let policy = policy();
        let now = Instant::now();
        let mut ctx = AttemptContext::new(Uuid::new_v4());

        let mut seen = Vec::new();
        loop {
            assert!(ctx.begin());
            match ctx.fail(&network(), &policy, now) {
                RetryDirective::RetryAfter(delay) => {
                    assert_eq!(ctx.state, AttemptState::FailedTransient);
                    assert_eq!(ctx.next_eligible_at, Some(now + delay));
                    seen.push(delay);
                }
                RetryDirective::Stop(kind) => {
                    assert_eq!(kind, FailureKind::MaxRetriesReached);
                    break;
                }
            }
        }

        assert_eq!(
            seen,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
        assert_eq!(ctx.attempts(), 4);
        assert_eq!(ctx.state, AttemptState::FailedTerminal);
        assert_eq!(ctx.last_failure, Some(FailureKind::MaxRetriesReached));
        assert!(!ctx.begin());
    }

    #[test]
    fn test_terminal_failure_stops_immediately() {
        let mut ctx = AttemptContext::new(Uuid::new_v4());
        ctx.begin();

        let directive = ctx.fail(
            &Error::InvalidAddress("bad".into()),
            &policy(),
            Instant::now(),
        );
        assert_eq!(directive, RetryDirective::Stop(FailureKind::Terminal));
        assert_eq!(ctx.retry_count, 0);
        assert!(ctx.last_error.as_deref().unwrap_or_default().contains("bad"));
    }

    #[test]
    fn test_transient_rejection_retries() {
        let mut ctx = AttemptContext::new(Uuid::new_v4());
        ctx.begin();
        let directive = ctx.fail(&Error::rejected_transient("SERVER_BUSY"), &policy(), Instant::now());
        assert!(matches!(directive, RetryDirective::RetryAfter(_)));
    }

    #[test]
    fn test_success() {
        let mut ctx = AttemptContext::new(Uuid::new_v4());
        assert_eq!(ctx.state, AttemptState::Idle);
        ctx.begin();
        ctx.succeed();
        assert_eq!(ctx.state, AttemptState::Succeeded);
        assert!(!ctx.begin());
    }
}
