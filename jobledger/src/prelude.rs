//! The purpose of this module is to alleviate the need to import many of the `[jobledger]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use jobledger::prelude::*;
//! ```
pub use crate::batch::{
    BatchAdapter, BatchError, NoAdapter, Resources, SubmittedJob, SubmittedJobSet,
};
pub use crate::calls::{CallError, CallRegistry};
pub use crate::job::{FinishState, Job, JobId, JobStatus, Walltime};
pub use crate::launch::Launch;
pub use crate::params::{Args, ParamTable, Reps};
pub use crate::store::memory::InMemoryStore;
pub use crate::store::{IdBlock, JobDb, Store, StoreError};
pub use crate::{LaunchError, Launcher};
