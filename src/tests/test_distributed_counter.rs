use std::{sync::Arc, time::Duration};

use super::{memory_store::MemoryStore, runtime};
use crate::{
    BackendKind, CacheTtlMs, DistributedCounter, DistributedCounterOptions, HealthStatus,
    RedisKey, Reservation, StockCounter, VacancyError,
};

fn options() -> DistributedCounterOptions {
    DistributedCounterOptions {
        cache_ttl: CacheTtlMs::from(60_000),
        lock_attempts: 3,
        lock_backoff: Duration::from_millis(1),
        lock_max_jitter: Duration::from_millis(1),
        ..DistributedCounterOptions::default()
    }
}

fn counter(store: &MemoryStore) -> DistributedCounter<MemoryStore> {
    DistributedCounter::new(store.clone(), options())
}

async fn seeded(store: &MemoryStore, initial: u64) -> DistributedCounter<MemoryStore> {
    let counter = counter(store);
    assert!(counter.initialize_stock(initial).await.unwrap());
    counter
}

#[test]
fn keys_follow_prefix_layout() {
    let store = MemoryStore::new();
    let counter = DistributedCounter::new(
        store,
        DistributedCounterOptions {
            prefix: RedisKey::try_from("shop").unwrap(),
            stock_key: RedisKey::try_from("seats").unwrap(),
            ..options()
        },
    );

    assert_eq!(counter.stock_key(), "shop:seats");
    assert_eq!(counter.lock_key(), "shop:seats:lock");
}

#[test]
fn initialize_stock_is_first_writer_wins() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let first = counter(&store);
        let second = counter(&store);

        assert!(first.initialize_stock(100).await.unwrap());
        assert!(!second.initialize_stock(5).await.unwrap());

        assert_eq!(store.value(first.stock_key()), Some(100));
        assert_eq!(second.get_current(false).await.unwrap(), 100);
    });
}

#[test]
fn reserve_decrements_store_and_releases_lock() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 1000).await;

        assert_eq!(
            counter.reserve(500).await.unwrap(),
            Reservation {
                success: true,
                remaining: 500
            }
        );
        assert_eq!(
            counter.reserve(600).await.unwrap(),
            Reservation {
                success: false,
                remaining: 500
            }
        );

        assert_eq!(store.value(counter.stock_key()), Some(500));
        assert_eq!(store.lock_holder(counter.lock_key()), None);
    });
}

#[test]
fn missing_stock_key_reads_as_zero() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = counter(&store);

        assert_eq!(counter.get_current(false).await.unwrap(), 0);
        assert_eq!(
            counter.reserve(1).await.unwrap(),
            Reservation {
                success: false,
                remaining: 0
            }
        );
        assert_eq!(store.value(counter.stock_key()), None);
    });
}

#[test]
fn invalid_quantity_never_touches_the_store() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 10).await;

        assert_eq!(
            counter.reserve(0).await.unwrap_err(),
            VacancyError::InvalidQuantity(0)
        );
        assert_eq!(
            counter.reserve(-2).await.unwrap_err(),
            VacancyError::InvalidQuantity(-2)
        );
        assert_eq!(store.lock_attempts(), 0);
        assert_eq!(store.value(counter.stock_key()), Some(10));
    });
}

#[test]
fn conflicting_write_is_retried_without_relocking() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 10).await;
        store.force_cas_conflicts(3);

        let r = counter.reserve(4).await.unwrap();

        assert!(r.success);
        assert_eq!(r.remaining, 6);
        assert_eq!(store.lock_attempts(), 1);
        assert_eq!(store.cas_calls(), 4);
        assert_eq!(store.lock_holder(counter.lock_key()), None);
    });
}

#[test]
fn persistent_conflicts_give_up_and_release_lock() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = DistributedCounter::new(
            store.clone(),
            DistributedCounterOptions {
                max_transaction_retries: 2,
                ..options()
            },
        );
        counter.initialize_stock(10).await.unwrap();
        store.force_cas_conflicts(5);

        assert_eq!(
            counter.reserve(1).await.unwrap_err(),
            VacancyError::TransactionConflict { attempts: 2 }
        );
        assert_eq!(store.value(counter.stock_key()), Some(10));
        assert_eq!(store.lock_holder(counter.lock_key()), None);
    });
}

#[test]
fn busy_lock_exhausts_attempts() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 10).await;
        store.hold_lock(counter.lock_key(), "someone-else", Duration::from_secs(30));

        assert_eq!(
            counter.reserve(1).await.unwrap_err(),
            VacancyError::LockUnavailable { attempts: 3 }
        );
        assert_eq!(store.lock_attempts(), 3);
        assert_eq!(store.value(counter.stock_key()), Some(10));
        assert_eq!(
            store.lock_holder(counter.lock_key()).as_deref(),
            Some("someone-else")
        );
    });
}

#[test]
fn expired_lock_is_acquired() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 10).await;
        store.hold_lock(counter.lock_key(), "crashed-holder", Duration::ZERO);

        assert!(counter.reserve(1).await.unwrap().success);
        assert_eq!(store.lock_holder(counter.lock_key()), None);
    });
}

#[test]
fn late_release_leaves_successor_lock_alone() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 10).await;
        store.steal_lock_on_cas(true);

        assert!(counter.reserve(2).await.unwrap().success);

        assert_eq!(
            store.lock_holder(counter.lock_key()).as_deref(),
            Some("intruder")
        );
    });
}

#[test]
fn store_outage_surfaces_backend_unavailable() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 10).await;
        store.set_available(false);

        let err = counter.reserve(1).await.unwrap_err();
        assert!(matches!(err, VacancyError::BackendUnavailable(_)));
        assert!(err.is_backend_failure());

        assert!(matches!(
            counter.get_current(false).await,
            Err(VacancyError::BackendUnavailable(_))
        ));
        assert!(matches!(
            counter.restock(1).await,
            Err(VacancyError::BackendUnavailable(_))
        ));
    });
}

#[test]
fn negative_stored_value_is_rejected() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = counter(&store);
        store.set_value(counter.stock_key(), -3);

        assert!(matches!(
            counter.reserve(1).await,
            Err(VacancyError::InvalidStoredValue(_))
        ));
        assert!(matches!(
            counter.get_current(false).await,
            Err(VacancyError::InvalidStoredValue(_))
        ));
        assert_eq!(store.lock_holder(counter.lock_key()), None);
    });
}

#[test]
fn cached_read_is_served_until_a_local_write() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 50).await;

        assert_eq!(counter.get_current(true).await.unwrap(), 50);

        // another process sells 5; this process still serves its snapshot
        store.set_value(counter.stock_key(), 45);
        assert_eq!(counter.get_current(true).await.unwrap(), 50);
        assert_eq!(counter.get_current(false).await.unwrap(), 45);

        assert!(counter.reserve(5).await.unwrap().success);
        assert_eq!(counter.get_current(true).await.unwrap(), 40);
    });
}

#[test]
fn restock_increments_shared_value() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 1).await;

        assert_eq!(counter.get_current(true).await.unwrap(), 1);
        assert_eq!(counter.restock(9).await.unwrap(), 10);
        assert_eq!(counter.get_current(true).await.unwrap(), 10);
        assert_eq!(
            counter.restock(-1).await.unwrap_err(),
            VacancyError::InvalidQuantity(-1)
        );
    });
}

#[test]
fn last_observed_tracks_store_values() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = counter(&store);
        assert_eq!(counter.last_observed(), None);

        counter.initialize_stock(20).await.unwrap();
        assert_eq!(counter.last_observed(), Some(20));

        counter.reserve(3).await.unwrap();
        assert_eq!(counter.last_observed(), Some(17));

        store.set_value(counter.stock_key(), 11);
        counter.get_current(false).await.unwrap();
        assert_eq!(counter.last_observed(), Some(11));
    });
}

#[test]
fn health_reports_store_state() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let counter = seeded(&store, 8).await;

        let health = counter.store_health().await;
        assert!(health.reachable);
        assert_eq!(health.current_stock, Some(8));
        assert_eq!(health.endpoint, "memory://test");
        assert_eq!(health.error, None);

        let report = StockCounter::health_check(&counter).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.backend, BackendKind::Distributed);
        assert_eq!(report.current_stock, 8);

        store.set_available(false);

        let health = counter.store_health().await;
        assert!(!health.reachable);
        assert_eq!(health.current_stock, None);
        assert!(health.error.is_some());

        let report = StockCounter::health_check(&counter).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
    });
}

#[test]
fn concurrent_counters_on_one_store_never_oversell() {
    runtime::block_on(async {
        let store = MemoryStore::new();
        let opts = DistributedCounterOptions {
            lock_attempts: 10_000,
            lock_backoff: Duration::ZERO,
            lock_max_jitter: Duration::from_millis(1),
            ..options()
        };
        let a = Arc::new(DistributedCounter::new(store.clone(), opts.clone()));
        let b = Arc::new(DistributedCounter::new(store.clone(), opts));
        a.initialize_stock(20).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..60 {
            let counter = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move { counter.reserve(1).await }));
        }

        let mut successes = 0;
        for h in handles {
            if h.await.unwrap().unwrap().success {
                successes += 1;
            }
        }

        assert_eq!(successes, 20);
        assert_eq!(store.value(a.stock_key()), Some(0));
        assert_eq!(store.lock_holder(a.lock_key()), None);
    });
}
