//! The local executor: runs each parameter row synchronously, in order, in
//! the calling process, recording one row per rep as it completes.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::calls::CallRegistry;
use crate::job::{FinishState, Job, JobId, Walltime};
use crate::params::{Args, ParamTable};
use crate::store::{IdBlock, JobDb, Store};
use crate::LaunchError;

pub(crate) struct LocalRunner<'a, S: Store> {
    db: &'a mut JobDb<S>,
    calls: &'a CallRegistry,
}

impl<'a, S: Store> LocalRunner<'a, S> {
    pub(crate) fn new(db: &'a mut JobDb<S>, calls: &'a CallRegistry) -> Self {
        Self { db, calls }
    }

    /// Run every row of `table` and record it. A fault inside the target
    /// function only marks its own row; a fault anywhere else (persistence,
    /// callback lookup, the callback itself) aborts the remaining rows and
    /// surfaces to the caller, with all previously recorded rows intact.
    #[tracing::instrument(skip_all, fields(call = %call))]
    pub(crate) fn run(
        &mut self,
        launched: DateTime<Utc>,
        call: &str,
        table: &ParamTable,
        fixed: &Args,
        comment: Option<&str>,
        finish: Option<&str>,
        ids: IdBlock,
    ) -> Result<Vec<JobId>, LaunchError> {
        let target = self.calls.call(call)?;
        let mut recorded = Vec::with_capacity(table.len());

        for (position, id) in ids.enumerate() {
            let args = table.merged(position, fixed);
            tracing::debug!(%id, call, "Running job {id} locally");

            let (outcome, measurement) =
                measure(|| panic::catch_unwind(AssertUnwindSafe(|| target(&args))));
            let error = match outcome {
                Ok(Ok(_value)) => None,
                Ok(Err(fault)) => Some(fault.to_string()),
                Err(panic) => Some(panic_message(panic)),
            };

            let job = Job::completed(id, launched, call, error)
                .with_measurement(measurement.mem_gb, measurement.walltime)
                .with_comment(comment.map(str::to_owned))
                .with_finish(finish.map(|name| FinishState::Invoking(name.to_owned())));
            let status = job.status;
            self.db.insert(job)?;
            tracing::info!(%id, %status, call, "Job {id} {status}");

            if let Some(name) = finish {
                let callback = self.calls.callback(name)?;
                callback(id, status).map_err(|fault| LaunchError::Callback {
                    name: name.to_owned(),
                    id,
                    message: fault.to_string(),
                })?;
                self.db.update(id, |job| {
                    job.finish = Some(FinishState::Invoked(name.to_owned()));
                })?;
            }
            recorded.push(id);
        }
        Ok(recorded)
    }
}

struct Measurement {
    walltime: Walltime,
    mem_gb: Option<f64>,
}

/// Run `work` under a measuring scope: elapsed wall time, plus the process
/// resident set sampled on either side of the call as a peak-memory reading.
fn measure<T>(work: impl FnOnce() -> T) -> (T, Measurement) {
    let mut system = System::new();
    let pid = sysinfo::get_current_pid().ok();
    let before = pid.and_then(|pid| process_memory(&mut system, pid));

    let start = Instant::now();
    let result = work();
    let walltime = Walltime::from(start.elapsed());

    let after = pid.and_then(|pid| process_memory(&mut system, pid));
    let peak = match (before, after) {
        (Some(before), Some(after)) => Some(before.max(after)),
        (before, after) => before.or(after),
    };

    (
        result,
        Measurement {
            walltime,
            mem_gb: peak.map(|bytes| bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
        },
    )
}

fn process_memory(system: &mut System, pid: Pid) -> Option<u64> {
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "job panicked".to_owned())
}
