//! Test suite for ensuring a correct implementation of a [`Store`].
use chrono::Utc;

use super::*;
use crate::job::JobStatus;

fn sample_job(id: i64) -> Job {
    Job::queued(id.into(), Utc::now(), "compute")
}

pub fn load_of_a_missing_key_is_none(store: impl Store) {
    assert!(matches!(store.load("suite"), Ok(None)));
}

pub fn save_then_load_round_trips(store: impl Store) {
    let jobs = vec![sample_job(1), sample_job(2)];
    store.save("suite", &jobs).unwrap();
    assert_eq!(store.load("suite").unwrap(), Some(jobs));
}

pub fn save_replaces_the_previous_table(store: impl Store) {
    store.save("suite", &[sample_job(1)]).unwrap();
    let mut replacement = sample_job(1);
    replacement.status = JobStatus::Finished;
    replacement.done = true;
    store.save("suite", &[replacement.clone(), sample_job(2)]).unwrap();

    let loaded = store.load("suite").unwrap().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], replacement);
}

pub fn acquire_is_exclusive_per_key(store: impl Store) {
    let lease = store.acquire("suite").unwrap();
    match store.acquire("suite") {
        Err(StoreError::Locked(key)) => assert_eq!(key, "suite"),
        Err(err) => panic!("expected Locked, got {err:?}"),
        Ok(_) => panic!("expected Locked, got a second lease"),
    }
    drop(lease);
    store.acquire("suite").unwrap();
}

pub fn distinct_keys_do_not_contend(store: impl Store) {
    let _lease = store.acquire("suite").unwrap();
    store.acquire("other").unwrap();
}

/// Create the conformance test suite for a [`Store`] implementation.
///
/// Store implementors should include this as part of their test suites. The
/// expression is evaluated once per generated test, so each test starts from
/// a fresh store.
///
/// ```
/// use jobledger::store::memory::InMemoryStore;
/// use jobledger::test_suite;
///
/// test_suite!(for: InMemoryStore::new());
/// ```
#[macro_export]
macro_rules! test_suite {
    (for: $store:expr) => {
        #[test]
        fn load_of_a_missing_key_is_none() {
            $crate::store::testing::load_of_a_missing_key_is_none($store);
        }
        #[test]
        fn save_then_load_round_trips() {
            $crate::store::testing::save_then_load_round_trips($store);
        }
        #[test]
        fn save_replaces_the_previous_table() {
            $crate::store::testing::save_replaces_the_previous_table($store);
        }
        #[test]
        fn acquire_is_exclusive_per_key() {
            $crate::store::testing::acquire_is_exclusive_per_key($store);
        }
        #[test]
        fn distinct_keys_do_not_contend() {
            $crate::store::testing::distinct_keys_do_not_contend($store);
        }
    };
}

pub use test_suite;
