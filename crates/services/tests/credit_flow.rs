use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use learn_core::model::DailyLimit;
use learn_core::time::fixed_now;
use services::{Clock, CreditError, CreditService, DayBoundary, LEDGER_KEY};
use storage::repository::{InMemoryRepository, KeyValueStore, StorageError};

fn credit_service(clock: Clock, limit: u32, store: Arc<dyn KeyValueStore>) -> CreditService {
    CreditService::new(
        clock,
        DayBoundary::utc(),
        DailyLimit::new(limit).unwrap(),
        store,
    )
}

/// Store that can be switched off to simulate disabled or full storage.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryRepository,
    down: AtomicBool,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.put(key, value).await
    }
}

#[tokio::test]
async fn window_resets_after_midnight() {
    let repo = InMemoryRepository::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(repo.clone());
    let mut clock = Clock::fixed(fixed_now());

    let today = credit_service(clock, 3, Arc::clone(&store));
    for _ in 0..3 {
        today.consume().await.unwrap();
    }
    let exhausted = today.peek().await;
    assert_eq!(exhausted.remaining(), 0);
    let Err(CreditError::QuotaExceeded { reset_at }) = today.consume().await else {
        panic!("expected quota error");
    };
    assert_eq!(reset_at, exhausted.reset_at());

    clock.advance(reset_at - fixed_now());
    let tomorrow = credit_service(clock, 3, Arc::clone(&store));
    let fresh = tomorrow.peek().await;
    assert_eq!(fresh.remaining(), 3);
    assert_eq!(fresh.total_used(), 0);
    assert!(fresh.reset_at() > reset_at);
    assert_eq!(fresh.reset_at() - reset_at, Duration::days(1));

    let spent = tomorrow.consume().await.unwrap();
    assert_eq!(spent.remaining(), 2);
}

#[tokio::test]
async fn consume_after_reset_time_starts_new_window() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryRepository::new());
    let mut clock = Clock::fixed(fixed_now());
    let first = credit_service(clock, 2, Arc::clone(&store));
    let before = first.consume().await.unwrap();

    clock.advance(Duration::days(2));
    let later = credit_service(clock, 2, Arc::clone(&store));
    let after = later.consume().await.unwrap();
    assert_eq!(after.remaining(), 1);
    assert!(after.reset_at() > before.reset_at());
}

#[tokio::test]
async fn ledger_survives_service_restart() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryRepository::new());
    let clock = Clock::fixed(fixed_now());

    let first = credit_service(clock, 5, Arc::clone(&store));
    first.consume().await.unwrap();
    first.consume().await.unwrap();
    drop(first);

    let second = credit_service(clock, 5, Arc::clone(&store));
    let ledger = second.peek().await;
    assert_eq!(ledger.remaining(), 3);
    assert_eq!(ledger.total_used(), 2);
    assert!(store.get(LEDGER_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn unavailable_storage_falls_back_to_session_ledger() {
    let store = Arc::new(FlakyStore::default());
    store.set_down(true);
    let svc = credit_service(Clock::fixed(fixed_now()), 2, store.clone());

    assert_eq!(svc.consume().await.unwrap().remaining(), 1);
    assert_eq!(svc.consume().await.unwrap().remaining(), 0);
    assert!(matches!(
        svc.consume().await,
        Err(CreditError::QuotaExceeded { .. })
    ));
    assert_eq!(svc.peek().await.remaining(), 0);

    // Once storage returns, the session copy is written back instead of a
    // fresh window being handed out.
    store.set_down(false);
    assert_eq!(svc.peek().await.remaining(), 0);
    assert!(store.get(LEDGER_KEY).await.unwrap().is_some());
    assert!(svc.consume().await.is_err());
}

#[tokio::test]
async fn refusal_survives_a_later_outage() {
    let store = Arc::new(FlakyStore::default());
    let clock = Clock::fixed(fixed_now());

    let first = credit_service(clock, 2, store.clone());
    first.consume().await.unwrap();
    first.consume().await.unwrap();

    let second = credit_service(clock, 2, store.clone());
    assert!(matches!(
        second.consume().await,
        Err(CreditError::QuotaExceeded { .. })
    ));

    store.set_down(true);
    assert!(matches!(
        second.consume().await,
        Err(CreditError::QuotaExceeded { .. })
    ));
    assert_eq!(second.peek().await.remaining(), 0);
}

#[tokio::test]
async fn spends_during_outage_are_not_handed_back() {
    let store = Arc::new(FlakyStore::default());
    let svc = credit_service(Clock::fixed(fixed_now()), 5, store.clone());
    assert_eq!(svc.consume().await.unwrap().remaining(), 4);

    store.set_down(true);
    assert_eq!(svc.consume().await.unwrap().remaining(), 3);
    assert_eq!(svc.consume().await.unwrap().remaining(), 2);

    // The store still holds the older copy with 4 left.
    store.set_down(false);
    assert_eq!(svc.peek().await.remaining(), 2);
    assert_eq!(svc.consume().await.unwrap().remaining(), 1);

    let restarted = credit_service(Clock::fixed(fixed_now()), 5, store.clone());
    assert_eq!(restarted.peek().await.remaining(), 1);
}

#[tokio::test]
async fn concurrent_consumers_never_overspend() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryRepository::new());
    let svc = Arc::new(credit_service(Clock::fixed(fixed_now()), 10, store));

    let mut handles = Vec::new();
    for _ in 0..25 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move { svc.consume().await.is_ok() }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 10);
    assert_eq!(svc.peek().await.total_used(), 10);
}
