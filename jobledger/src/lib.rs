//! Launch parameterized jobs on a cluster or in-process, and keep one durable
//! record of every job's identity, launch, resource usage, and completion.
//!
//! A [`Launcher`] owns an exclusively opened job database, a registry of
//! named target functions and completion callbacks, and a batch submission
//! adapter. [`Launcher::launch`] expands the repetition input into one row of
//! arguments per job, allocates a contiguous block of fresh job ids, and
//! either submits the whole batch through the adapter or runs each rep
//! synchronously. Both paths append to the job database and persist after
//! every structural change, so interrupting a run never loses a row that was
//! already recorded.
//!
//! ```
//! use jobledger::prelude::*;
//! use serde_json::json;
//!
//! let mut calls = CallRegistry::new();
//! calls.register("double", |args: &Args| {
//!     let n = args.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok(json!(2 * n))
//! });
//!
//! let db = JobDb::open(InMemoryStore::new(), JobDb::<InMemoryStore>::DEFAULT_KEY)?;
//! let mut launcher = Launcher::new(db, calls);
//!
//! let ids = launcher.launch(
//!     Launch::call("double")
//!         .with_reps(json!([1, 2, 3]))
//!         .with_argname("n")
//!         .local(),
//! )?;
//! assert_eq!(ids.len(), 3);
//! # Ok::<(), jobledger::LaunchError>(())
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod batch;
pub mod calls;
pub mod job;
pub mod launch;
mod local;
pub mod params;
pub mod prelude;
pub mod store;
pub mod testing;

use batch::{BatchAdapter, BatchError, NoAdapter, Resources};
use calls::CallRegistry;
use job::{FinishState, Job, JobId};
use launch::{Launch, Mode};
use local::LocalRunner;
use params::{Args, ParamTable};
use store::{IdBlock, JobDb, Store, StoreError};

/// The launch engine: job database, call registry, and submission adapter.
///
/// All collaborators are injected and owned; there is no ambient global
/// state, and the database lease is released when the launcher is dropped.
pub struct Launcher<S: Store, A: BatchAdapter> {
    db: JobDb<S>,
    calls: CallRegistry,
    adapter: A,
}

impl<S: Store> Launcher<S, NoAdapter> {
    /// A local-only launcher; batch launches are rejected by [`NoAdapter`].
    pub fn new(db: JobDb<S>, calls: CallRegistry) -> Self {
        Self::with_adapter(db, calls, NoAdapter)
    }
}

impl<S: Store, A: BatchAdapter> Launcher<S, A> {
    pub fn with_adapter(db: JobDb<S>, calls: CallRegistry, adapter: A) -> Self {
        Self { db, calls, adapter }
    }

    /// The underlying job database, e.g. for sweep-style status updates or
    /// reporting.
    pub fn db(&mut self) -> &mut JobDb<S> {
        &mut self.db
    }

    pub fn calls_mut(&mut self) -> &mut CallRegistry {
        &mut self.calls
    }

    /// Execute one launch call and return the ids of the jobs it recorded.
    ///
    /// The shared `launched` timestamp is taken once, and the id block is
    /// allocated once, before dispatching on the mode.
    pub fn launch(&mut self, launch: Launch) -> Result<Vec<JobId>, LaunchError> {
        let Launch {
            call,
            reps,
            argname,
            moreargs,
            resources,
            mode,
            comment,
            finish,
        } = launch;

        let table = reps.expand(&argname)?;
        table.ensure_disjoint(&moreargs)?;
        let launched = Utc::now();
        let ids = self.db.allocate(table.len())?;

        match mode {
            Mode::Local => LocalRunner::new(&mut self.db, &self.calls).run(
                launched,
                &call,
                &table,
                &moreargs,
                comment.as_deref(),
                finish.as_deref(),
                ids,
            ),
            Mode::Batch { regdir } => self.submit_batch(SubmitBatch {
                launched,
                call: &call,
                table: &table,
                moreargs: &moreargs,
                resources: &resources,
                comment: comment.as_deref(),
                finish: finish.as_deref(),
                regdir: &regdir,
                ids,
            }),
        }
    }

    fn submit_batch(&mut self, submit: SubmitBatch<'_>) -> Result<Vec<JobId>, LaunchError> {
        let SubmitBatch {
            launched,
            call,
            table,
            moreargs,
            resources,
            comment,
            finish,
            regdir,
            ids,
        } = submit;

        let name = batch::next_registry_name(regdir)?;
        let dir = regdir.join(&name);
        let mut registry = self.adapter.create_registry(&dir)?;
        let jobs = self.adapter.map_call(&mut registry, call, table, moreargs)?;
        let submitted = self.adapter.submit(&mut registry, jobs, resources)?;
        if submitted.len() != table.len() {
            return Err(LaunchError::Submission(BatchError::Adapter(format!(
                "expected {} submission handles, got {}",
                table.len(),
                submitted.len()
            ))));
        }

        let rows: Vec<Job> = ids
            .zip(submitted.jobs)
            .map(|(id, handle)| {
                Job::queued(id, launched, call)
                    .with_registry(name.clone())
                    .with_submission(handle.bjobid, handle.sjobid)
                    .with_comment(comment.map(str::to_owned))
                    .with_finish(finish.map(|callback| FinishState::Pending(callback.to_owned())))
            })
            .collect();
        let recorded: Vec<JobId> = rows.iter().map(|job| job.id).collect();
        self.db.insert_all(rows)?;
        tracing::info!(
            registry = %name,
            count = recorded.len(),
            "Submitted {} jobs under registry {name}",
            recorded.len()
        );
        Ok(recorded)
    }
}

/// Arguments of one batch submission, bundled to keep the call site readable.
struct SubmitBatch<'a> {
    launched: DateTime<Utc>,
    call: &'a str,
    table: &'a ParamTable,
    moreargs: &'a Args,
    resources: &'a Resources,
    comment: Option<&'a str>,
    finish: Option<&'a str>,
    regdir: &'a std::path::Path,
    ids: IdBlock,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid repetition parameters: {0}")]
    InvalidParameters(String),
    #[error("job storage unavailable")]
    Storage(#[from] StoreError),
    #[error("batch submission failed")]
    Submission(#[from] BatchError),
    #[error("no function named `{0}` is registered")]
    UnknownCall(String),
    #[error("no completion callback named `{0}` is registered")]
    UnknownCallback(String),
    #[error("completion callback `{name}` failed for job {id}: {message}")]
    Callback {
        name: String,
        id: JobId,
        message: String,
    },
}
