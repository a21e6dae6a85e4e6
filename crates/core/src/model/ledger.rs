use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::DayBoundary;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("daily limit must be > 0")]
    InvalidDailyLimit,

    #[error("daily credits exhausted until {reset_at}")]
    QuotaExceeded { reset_at: DateTime<Utc> },

    #[error("ledger holds {remaining} credits but the daily limit is {limit}")]
    RemainingAboveLimit { remaining: u32, limit: u32 },

    #[error("ledger resets at {reset_at}, later than the next day boundary")]
    ResetTooFar { reset_at: DateTime<Utc> },
}

//
// ─── DAILY LIMIT ───────────────────────────────────────────────────────────────
//

/// Number of billable operations allowed per calendar day. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyLimit(u32);

impl DailyLimit {
    pub const DEFAULT: Self = Self(50);

    /// # Errors
    ///
    /// Returns `LedgerError::InvalidDailyLimit` for zero.
    pub fn new(limit: u32) -> Result<Self, LedgerError> {
        if limit == 0 {
            return Err(LedgerError::InvalidDailyLimit);
        }
        Ok(Self(limit))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for DailyLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

//
// ─── LEDGER ────────────────────────────────────────────────────────────────────
//

/// Persisted record of the daily credit window.
///
/// Serialized with camelCase keys so a stored record reads as
/// `{"remaining":..,"resetAt":..,"totalUsed":..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLedger {
    remaining: u32,
    reset_at: DateTime<Utc>,
    total_used: u64,
}

impl CreditLedger {
    /// A full window starting at `now`.
    #[must_use]
    pub fn fresh(limit: DailyLimit, now: DateTime<Utc>, boundary: DayBoundary) -> Self {
        Self {
            remaining: limit.get(),
            reset_at: boundary.next_midnight(now),
            total_used: 0,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    #[must_use]
    pub fn total_used(&self) -> u64 {
        self.total_used
    }

    /// True once the window has closed and the ledger must be replaced.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spend one credit.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::QuotaExceeded` when no credits remain.
    pub fn consume(self) -> Result<Self, LedgerError> {
        if self.is_exhausted() {
            return Err(LedgerError::QuotaExceeded {
                reset_at: self.reset_at,
            });
        }
        Ok(Self {
            remaining: self.remaining - 1,
            reset_at: self.reset_at,
            total_used: self.total_used.saturating_add(1),
        })
    }

    /// Check a ledger read back from storage against the active limit.
    ///
    /// `horizon` is the latest reset time a well-formed ledger can carry.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` when the ledger cannot have been written under
    /// the current limit and day boundary.
    pub fn validate(&self, limit: DailyLimit, horizon: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.remaining > limit.get() {
            return Err(LedgerError::RemainingAboveLimit {
                remaining: self.remaining,
                limit: limit.get(),
            });
        }
        if self.reset_at > horizon {
            return Err(LedgerError::ResetTooFar {
                reset_at: self.reset_at,
            });
        }
        Ok(())
    }
}
