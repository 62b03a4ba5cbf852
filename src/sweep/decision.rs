//! Sweep decision
//!
//! Pure function of balance, threshold and fee. No I/O.

use crate::chain::Amount;

/// Why a wallet was left alone this round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Balance is below the owner's threshold (or zero with no threshold)
    BelowThreshold,
    /// The fee would eat the whole balance
    FeeExceedsBalance,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BelowThreshold => write!(f, "below threshold"),
            SkipReason::FeeExceedsBalance => write!(f, "fee exceeds balance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDecision {
    /// Send `amount` (balance minus fee) to the receiver
    Sweep { amount: Amount },
    Skip(SkipReason),
}

/// Threshold 0 means any positive balance qualifies
pub fn meets_threshold(balance: Amount, threshold: Amount) -> bool {
    if threshold == 0 {
        balance > 0
    } else {
        balance >= threshold
    }
}

/// Decide whether to sweep and how much
pub fn decide(balance: Amount, threshold: Amount, fee: Amount) -> SweepDecision {
    if !meets_threshold(balance, threshold) {
        return SweepDecision::Skip(SkipReason::BelowThreshold);
    }

    match balance.checked_sub(fee) {
        Some(amount) if amount > 0 => SweepDecision::Sweep { amount },
        _ => SweepDecision::Skip(SkipReason::FeeExceedsBalance),
    }
}
