use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use learn_core::model::{CreditLedger, DailyLimit};
use storage::repository::KeyValueStore;

use crate::error::CreditError;
use crate::{Clock, DayBoundary};

/// Key the ledger is stored under in the key-value store.
pub const LEDGER_KEY: &str = "credit_ledger";

/// Advisory daily cap on billable operations such as AI completions.
///
/// The ledger lives in the injected key-value store. When the store cannot be
/// read or written the service keeps going on a session-scoped copy and tries
/// the store again on the next call.
pub struct CreditService {
    clock: Clock,
    boundary: DayBoundary,
    limit: DailyLimit,
    store: Arc<dyn KeyValueStore>,
    // Last ledger this service saw; also serialises read-modify-write.
    session: Mutex<Option<CreditLedger>>,
}

/// Ledger plus whether the store is behind it.
struct Loaded {
    ledger: CreditLedger,
    dirty: bool,
}

impl CreditService {
    #[must_use]
    pub fn new(
        clock: Clock,
        boundary: DayBoundary,
        limit: DailyLimit,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            clock,
            boundary,
            limit,
            store,
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn limit(&self) -> DailyLimit {
        self.limit
    }

    /// Spend one credit and return the updated ledger.
    ///
    /// An expired window is replaced with a full one first.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::QuotaExceeded` with the reset time when today's
    /// credits are used up.
    pub async fn consume(&self) -> Result<CreditLedger, CreditError> {
        let mut session = self.session.lock().await;
        let now = self.clock.now();
        let Loaded { ledger, dirty } = self.load(*session, now).await;

        let updated = match ledger.consume() {
            Ok(updated) => updated,
            Err(err) => {
                info!(error = %err, "credit request refused");
                // Remember the exhausted window so a later outage cannot reopen it.
                if dirty {
                    self.save(&mut session, ledger).await;
                } else {
                    *session = Some(ledger);
                }
                return Err(CreditError::QuotaExceeded {
                    reset_at: ledger.reset_at(),
                });
            }
        };

        self.save(&mut session, updated).await;
        debug!(
            remaining = updated.remaining(),
            total_used = updated.total_used(),
            "credit consumed"
        );
        Ok(updated)
    }

    /// Current ledger without spending anything.
    ///
    /// Applies the same lazy reset as `consume`; a reset is written back so
    /// later reads agree.
    pub async fn peek(&self) -> CreditLedger {
        let mut session = self.session.lock().await;
        let now = self.clock.now();
        let Loaded { ledger, dirty } = self.load(*session, now).await;
        if dirty {
            self.save(&mut session, ledger).await;
        } else {
            *session = Some(ledger);
        }
        ledger
    }

    async fn load(&self, session: Option<CreditLedger>, now: DateTime<Utc>) -> Loaded {
        // A ledger missing from the store falls back to the session copy so a
        // wiped or unreachable store does not hand out a fresh window.
        let (current, in_store) = match self.store.get(LEDGER_KEY).await {
            Ok(Some(raw)) => match (self.decode(&raw, now), session) {
                // Spends made while the store was down only exist in the session copy.
                (Some(stored), Some(ours))
                    if ours.reset_at() == stored.reset_at()
                        && ours.remaining() < stored.remaining() =>
                {
                    (Some(ours), false)
                }
                (Some(stored), _) => (Some(stored), true),
                (None, _) => (None, false),
            },
            Ok(None) => (session, false),
            Err(err) => {
                warn!(error = %err, "credit ledger unreadable; using session ledger");
                (session, false)
            }
        };

        match current {
            Some(ledger) if !ledger.is_expired(now) => Loaded {
                ledger,
                dirty: !in_store,
            },
            Some(expired) => {
                info!(reset_at = %expired.reset_at(), "credit window rolled over");
                Loaded {
                    ledger: CreditLedger::fresh(self.limit, now, self.boundary),
                    dirty: true,
                }
            }
            None => Loaded {
                ledger: CreditLedger::fresh(self.limit, now, self.boundary),
                dirty: true,
            },
        }
    }

    /// Malformed records are logged and treated as absent.
    fn decode(&self, raw: &str, now: DateTime<Utc>) -> Option<CreditLedger> {
        let ledger: CreditLedger = match serde_json::from_str(raw) {
            Ok(ledger) => ledger,
            Err(err) => {
                warn!(error = %err, "credit ledger malformed; starting a new one");
                return None;
            }
        };
        // A day boundary can shift by a DST hour; anything past that was not
        // written under this boundary.
        let horizon = self.boundary.next_midnight(now) + Duration::hours(1);
        match ledger.validate(self.limit, horizon) {
            Ok(()) => Some(ledger),
            Err(err) => {
                warn!(error = %err, "credit ledger rejected; starting a new one");
                None
            }
        }
    }

    async fn save(&self, session: &mut Option<CreditLedger>, ledger: CreditLedger) {
        *session = Some(ledger);
        let raw = match serde_json::to_string(&ledger) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "credit ledger could not be encoded");
                return;
            }
        };
        if let Err(err) = self.store.put(LEDGER_KEY, &raw).await {
            warn!(error = %err, "credit ledger not persisted; keeping session copy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn service(clock: Clock, limit: u32, repo: &InMemoryRepository) -> CreditService {
        CreditService::new(
            clock,
            DayBoundary::utc(),
            DailyLimit::new(limit).unwrap(),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn first_use_creates_full_ledger() {
        let repo = InMemoryRepository::new();
        let svc = service(Clock::fixed(fixed_now()), 5, &repo);

        let ledger = svc.peek().await;
        assert_eq!(ledger.remaining(), 5);
        assert_eq!(ledger.total_used(), 0);
        assert!(ledger.reset_at() > fixed_now());
        assert!(repo.get(LEDGER_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn peek_never_changes_remaining() {
        let repo = InMemoryRepository::new();
        let svc = service(Clock::fixed(fixed_now()), 3, &repo);
        svc.consume().await.unwrap();

        for _ in 0..10 {
            assert_eq!(svc.peek().await.remaining(), 2);
        }
    }

    #[tokio::test]
    async fn limit_plus_one_fails_with_reset_time() {
        let repo = InMemoryRepository::new();
        let svc = service(Clock::fixed(fixed_now()), 50, &repo);

        let mut last = None;
        for _ in 0..50 {
            last = Some(svc.consume().await.unwrap());
        }
        let last = last.unwrap();
        assert_eq!(last.remaining(), 0);
        assert_eq!(last.total_used(), 50);

        let err = svc.consume().await.unwrap_err();
        assert_eq!(
            err,
            CreditError::QuotaExceeded {
                reset_at: last.reset_at()
            }
        );
    }

    #[tokio::test]
    async fn malformed_ledger_is_replaced() {
        let repo = InMemoryRepository::new();
        repo.put(LEDGER_KEY, "{not json").await.unwrap();
        let svc = service(Clock::fixed(fixed_now()), 4, &repo);

        let ledger = svc.consume().await.unwrap();
        assert_eq!(ledger.remaining(), 3);

        let raw = repo.get(LEDGER_KEY).await.unwrap().unwrap();
        let stored: CreditLedger = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, ledger);
    }

    #[tokio::test]
    async fn reset_shifted_by_dst_hour_is_kept() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        // Written under an offset one hour behind the current one.
        let reset_at = DayBoundary::utc().next_midnight(now) + Duration::hours(1);
        let raw = format!(
            r#"{{"remaining":2,"resetAt":"{}","totalUsed":3}}"#,
            reset_at.to_rfc3339()
        );
        repo.put(LEDGER_KEY, &raw).await.unwrap();
        let svc = service(Clock::fixed(now), 5, &repo);

        let ledger = svc.peek().await;
        assert_eq!(ledger.remaining(), 2);
        assert_eq!(ledger.reset_at(), reset_at);
    }

    #[tokio::test]
    async fn reset_beyond_dst_slack_is_replaced() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let reset_at = DayBoundary::utc().next_midnight(now) + Duration::hours(2);
        let raw = format!(
            r#"{{"remaining":0,"resetAt":"{}","totalUsed":5}}"#,
            reset_at.to_rfc3339()
        );
        repo.put(LEDGER_KEY, &raw).await.unwrap();
        let svc = service(Clock::fixed(now), 5, &repo);

        let ledger = svc.peek().await;
        assert_eq!(ledger.remaining(), 5);
        assert_eq!(ledger.reset_at(), DayBoundary::utc().next_midnight(now));
    }

    #[tokio::test]
    async fn ledger_above_limit_is_replaced() {
        let repo = InMemoryRepository::new();
        let generous = service(Clock::fixed(fixed_now()), 100, &repo);
        generous.consume().await.unwrap();

        let strict = service(Clock::fixed(fixed_now()), 10, &repo);
        assert_eq!(strict.peek().await.remaining(), 10);
    }
}
