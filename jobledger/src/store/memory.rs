//! Provides an in memory implementation of [`Store`].
//!
//! Currently this is provided for testing purposes and not designed for use in a production system.
//!
//! It is not optimized, instead it is designed to be a correct implementation for use in a test
//! setup.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use super::{Store, StoreError};
use crate::job::Job;

/// An in memory implementation of [`Store`].
///
/// Clones share one set of tables, so a test can hand a clone to the engine
/// and keep one for assertions.
///
/// **This is not designed for use in production systems.**
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<HashMap<String, Vec<Job>>>>,
    held: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryStore {
    /// Creates a new instance of [`InMemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

/// Releases its key when dropped.
pub struct InMemoryLease {
    held: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InMemoryLease {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.key);
        }
    }
}

impl Store for InMemoryStore {
    type Lease = InMemoryLease;

    fn acquire(&self, key: &str) -> Result<Self::Lease, StoreError> {
        let mut held = self.held.lock().map_err(|_| StoreError::BadState)?;
        if !held.insert(key.to_owned()) {
            return Err(StoreError::Locked(key.to_owned()));
        }
        Ok(InMemoryLease {
            held: Arc::clone(&self.held),
            key: key.to_owned(),
        })
    }

    fn load(&self, key: &str) -> Result<Option<Vec<Job>>, StoreError> {
        Ok(self
            .tables
            .lock()
            .map_err(|_| StoreError::BadState)?
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, jobs: &[Job]) -> Result<(), StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::BadState)?
            .insert(key.to_owned(), jobs.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_suite;
    use chrono::Utc;

    test_suite!(for: InMemoryStore::new());

    #[test]
    fn clones_share_the_saved_tables() {
        let store = InMemoryStore::new();
        let observer = store.clone();
        store
            .save("jobs", &[Job::queued(1.into(), Utc::now(), "compute")])
            .unwrap();
        assert_eq!(observer.load("jobs").unwrap().unwrap().len(), 1);
    }
}
