//! The job database: in-memory table, persistence contract, id allocation.
//!
//! Persistence itself belongs to an external collaborator implementing
//! [`Store`]; this module owns the discipline around it. A database key is
//! opened exclusively, loaded lazily on first access, and saved after every
//! structural change, so rows recorded before an interruption always survive
//! it.

use thiserror::Error;

use crate::job::{Job, JobId};

pub mod memory;
pub mod testing;

/// Contract of the persistence collaborator.
///
/// Implementations store one job table per `key`. [`Store::acquire`] hands
/// out an exclusive lease per key; id and registry allocation only ever
/// happens under a lease, which closes the read-then-write race between
/// concurrent launchers.
pub trait Store {
    /// Held for the whole life of an open [`JobDb`]; dropping it releases
    /// the key for the next launcher.
    type Lease;

    fn acquire(&self, key: &str) -> Result<Self::Lease, StoreError>;

    /// `Ok(None)` when no table was ever saved under `key`.
    fn load(&self, key: &str) -> Result<Option<Vec<Job>>, StoreError>;

    fn save(&self, key: &str, jobs: &[Job]) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error encoding or decoding the job table")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("error reading or writing the job table")]
    Io(#[from] std::io::Error),
    #[error("job database `{0}` is held by another launcher")]
    Locked(String),
    #[error("no job with id {0}")]
    JobNotFound(JobId),
    #[error("job store in bad state")]
    BadState,
}

/// A contiguous block of freshly allocated job ids, yielded in order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IdBlock {
    next: i64,
    end: i64,
}

impl IdBlock {
    pub fn len(&self) -> usize {
        (self.end - self.next + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for IdBlock {
    type Item = JobId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.end {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id.into())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}

impl ExactSizeIterator for IdBlock {}

/// An exclusively opened job database.
pub struct JobDb<S: Store> {
    store: S,
    key: String,
    _lease: S::Lease,
    jobs: Option<Vec<Job>>,
}

impl<S: Store> std::fmt::Debug for JobDb<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDb")
            .field("key", &self.key)
            .field("loaded", &self.jobs.is_some())
            .finish()
    }
}

impl<S: Store> JobDb<S> {
    /// The well-known key most deployments keep their single table under.
    pub const DEFAULT_KEY: &'static str = "jobs";

    /// Acquire `key` and open its table. The table itself is not read until
    /// first access.
    pub fn open(store: S, key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        let lease = store.acquire(&key)?;
        Ok(Self {
            store,
            key,
            _lease: lease,
            jobs: None,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn loaded(&mut self) -> Result<&mut Vec<Job>, StoreError> {
        if let Some(ref mut jobs) = self.jobs {
            return Ok(jobs);
        }
        let jobs = self.store.load(&self.key)?.unwrap_or_default();
        Ok(self.jobs.insert(jobs))
    }

    /// Every recorded row, in insertion order.
    pub fn jobs(&mut self) -> Result<&[Job], StoreError> {
        self.loaded().map(|jobs| jobs.as_slice())
    }

    pub fn find(&mut self, id: JobId) -> Result<Option<&Job>, StoreError> {
        Ok(self.loaded()?.iter().find(|job| job.id == id))
    }

    /// Reserve the next `count` ids: the contiguous range just above the
    /// current maximum. Call this exactly once per launch and thread the
    /// block through; recomputing it mid-call would hand out duplicates.
    pub fn allocate(&mut self, count: usize) -> Result<IdBlock, StoreError> {
        let max = self
            .loaded()?
            .iter()
            .map(|job| i64::from(job.id))
            .max()
            .unwrap_or(0);
        Ok(IdBlock {
            next: max + 1,
            end: max + count as i64,
        })
    }

    /// Append one row and persist.
    pub fn insert(&mut self, job: Job) -> Result<(), StoreError> {
        self.loaded()?.push(job);
        self.persist()
    }

    /// Append a batch of rows and persist once.
    pub fn insert_all(&mut self, jobs: impl IntoIterator<Item = Job>) -> Result<(), StoreError> {
        self.loaded()?.extend(jobs);
        self.persist()
    }

    /// Mutate the row with `id` in place and persist.
    pub fn update<F>(&mut self, id: JobId, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let jobs = self.loaded()?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => return Err(StoreError::JobNotFound(id)),
            Some(job) => update(job),
        }
        self.persist()
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let jobs = self.jobs.as_deref().unwrap_or_default();
        self.store.save(&self.key, jobs).inspect_err(|err| {
            tracing::error!(?err, key = %self.key, "Failed to persist the job database")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryStore;
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn open(store: &InMemoryStore) -> JobDb<InMemoryStore> {
        JobDb::open(store.clone(), JobDb::<InMemoryStore>::DEFAULT_KEY).unwrap()
    }

    #[test]
    fn allocation_on_an_empty_database_starts_at_one() {
        let store = InMemoryStore::new();
        let mut db = open(&store);
        let ids: Vec<i64> = db.allocate(3).unwrap().map(i64::from).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn allocation_is_contiguous_above_the_recorded_maximum() {
        let store = InMemoryStore::new();
        let mut db = open(&store);
        db.insert(Job::queued(7.into(), Utc::now(), "compute")).unwrap();
        let ids: Vec<i64> = db.allocate(2).unwrap().map(i64::from).collect();
        assert_eq!(ids, [8, 9]);
    }

    #[test]
    fn ids_stay_monotonic_across_reopen() {
        let store = InMemoryStore::new();
        {
            let mut db = open(&store);
            let ids = db.allocate(3).unwrap();
            let launched = Utc::now();
            db.insert_all(ids.map(|id| Job::queued(id, launched, "compute"))).unwrap();
        }
        let mut db = open(&store);
        let ids: Vec<i64> = db.allocate(3).unwrap().map(i64::from).collect();
        assert_eq!(ids, [4, 5, 6]);
    }

    #[test]
    fn insert_persists_immediately() {
        let store = InMemoryStore::new();
        let mut db = open(&store);
        db.insert(Job::queued(1.into(), Utc::now(), "compute")).unwrap();
        let persisted = store.load(db.key()).unwrap().unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[test]
    fn update_persists_and_rejects_missing_ids() {
        let store = InMemoryStore::new();
        let mut db = open(&store);
        db.insert(Job::queued(1.into(), Utc::now(), "compute")).unwrap();

        db.update(1.into(), |job| job.comment = Some("first".to_owned())).unwrap();
        let persisted = store.load(db.key()).unwrap().unwrap();
        assert_eq!(persisted[0].comment.as_deref(), Some("first"));

        assert_matches!(
            db.update(99.into(), |_| {}),
            Err(StoreError::JobNotFound(id)) if i64::from(id) == 99
        );
    }

    #[test]
    fn lazy_load_sees_rows_saved_before_open() {
        let store = InMemoryStore::new();
        let rows = vec![Job::queued(1.into(), Utc::now(), "compute")];
        store.save("jobs", &rows).unwrap();

        let mut db = open(&store);
        assert_eq!(db.jobs().unwrap(), rows.as_slice());
    }

    #[test]
    fn open_is_exclusive_per_key() {
        let store = InMemoryStore::new();
        let db = open(&store);
        assert_matches!(
            JobDb::open(store.clone(), "jobs"),
            Err(StoreError::Locked(_))
        );
        drop(db);
        JobDb::open(store, "jobs").unwrap();
    }

    #[test]
    fn id_block_is_an_exact_size_iterator() {
        let block = IdBlock { next: 4, end: 6 };
        assert_eq!(block.len(), 3);
        assert!(!block.is_empty());
        assert_eq!(block.last(), Some(6.into()));
    }
}
