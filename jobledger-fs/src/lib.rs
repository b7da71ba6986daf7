//! A file-backed implementation of the jobledger [`Store`].
//!
//! Each database key is one pretty-printed JSON document under the store's
//! root directory. Saves go through a temporary file in the same directory
//! and atomically replace the target, so an interrupted save never corrupts
//! rows that were already recorded. The exclusive per-key lease is a lock
//! file created with `create_new`; it is removed when the lease drops.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use jobledger::job::Job;
use jobledger::store::{Store, StoreError};
use tempfile::NamedTempFile;

/// A [`Store`] keeping one JSON document per database key.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory (and parents)
    /// if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.lock"))
    }
}

/// Removes its lock file when dropped.
#[derive(Debug)]
pub struct FsLease {
    path: PathBuf,
}

impl Drop for FsLease {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(?err, path = ?self.path, "Failed to remove the lock file");
        }
    }
}

impl Store for FsStore {
    type Lease = FsLease;

    fn acquire(&self, key: &str) -> Result<Self::Lease, StoreError> {
        let path = self.lock_path(key);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_file) => Ok(FsLease { path }),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::Locked(key.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn load(&self, key: &str) -> Result<Option<Vec<Job>>, StoreError> {
        let file = match File::open(self.table_path(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let jobs = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(jobs))
    }

    fn save(&self, key: &str, jobs: &[Job]) -> Result<(), StoreError> {
        let tmp = NamedTempFile::new_in(&self.root)?;
        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, jobs)?;
        let tmp = writer.into_inner().map_err(|err| err.into_error())?;
        tmp.persist(self.table_path(key)).map_err(|err| err.error)?;
        Ok(())
    }
}
