//! Helpers for testing.

/// A macro for making assertions about the rows recorded in a [`JobDb`].
///
/// Criteria can be combined; every listed criterion must hold for a row to
/// count. On failure the full table is printed alongside the criteria.
///
/// [`JobDb`]: crate::store::JobDb
///
/// # Example
///
/// ```
/// use jobledger::prelude::*;
/// use jobledger::assert_recorded;
/// use chrono::Utc;
///
/// let mut db = JobDb::open(InMemoryStore::new(), "jobs").unwrap();
/// db.insert(Job::queued(1.into(), Utc::now(), "compute").with_registry("reg001"))
///     .unwrap();
///
/// assert_recorded!(1 job, in: db, for_call: "compute");
/// assert_recorded!(1 job, in: db, with_status: JobStatus::Queued, in_registry: "reg001");
/// assert_recorded!(0 jobs, in: db, with_status: JobStatus::Finished);
/// ```
#[macro_export]
macro_rules! assert_recorded {
    (1 job, in: $db:expr, $($tail:tt)*) => {
        assert_recorded!(@internal 1, $db, $($tail)*);
    };
    ($n:literal jobs, in: $db:expr, $($tail:tt)*) => {
        assert_recorded!(@internal $n, $db, $($tail)*);
    };
    (@internal $n:literal, $db:expr, $($tail:tt)*) => {{
        let mut criteria: Vec<Box<dyn Fn(&$crate::job::Job) -> bool>> = Vec::new();
        assert_recorded!(@criterion criteria; $($tail)*);
        let jobs = $db.jobs().unwrap();
        let matching = jobs
            .iter()
            .filter(|job| criteria.iter().all(|criterion| criterion(job)))
            .count();
        assert!(
            matching == $n,
            "Expected {} matching rows, found {matching}\n\n\
            Criteria: {}\n\n\
            All recorded rows:\n\
            {jobs:#?}",
            $n,
            stringify!($($tail)*),
        );
    }};
    (@criterion $vec:ident;) => {};
    (@criterion $vec:ident; with_status: $status:expr $(, $($tail:tt)*)?) => {
        let status = $status;
        $vec.push(Box::new(move |job| job.status == status));
        $(assert_recorded!(@criterion $vec; $($tail)*))?
    };
    (@criterion $vec:ident; for_call: $call:expr $(, $($tail:tt)*)?) => {
        let call = $call;
        $vec.push(Box::new(move |job| job.call == call));
        $(assert_recorded!(@criterion $vec; $($tail)*))?
    };
    (@criterion $vec:ident; in_registry: $registry:expr $(, $($tail:tt)*)?) => {
        let registry = $registry;
        $vec.push(Box::new(move |job| job.registry.as_deref() == Some(registry)));
        $(assert_recorded!(@criterion $vec; $($tail)*))?
    };
    (@criterion $vec:ident; with_comment: $comment:expr $(, $($tail:tt)*)?) => {
        let comment = $comment;
        $vec.push(Box::new(move |job| job.comment.as_deref() == Some(comment)));
        $(assert_recorded!(@criterion $vec; $($tail)*))?
    };
    (@criterion $vec:ident; done: $done:expr $(, $($tail:tt)*)?) => {
        let done = $done;
        $vec.push(Box::new(move |job| job.done == done));
        $(assert_recorded!(@criterion $vec; $($tail)*))?
    };
}

pub use assert_recorded;

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::prelude::*;

    #[test]
    fn assert_recorded() {
        let mut db = JobDb::open(InMemoryStore::new(), "jobs").unwrap();
        let launched = Utc::now();
        db.insert_all([
            Job::queued(1.into(), launched, "compute")
                .with_registry("reg001")
                .with_comment(Some("sweep".to_owned())),
            Job::queued(2.into(), launched, "compute").with_registry("reg001"),
            Job::completed(3.into(), launched, "other", None),
        ])
        .unwrap();

        assert_recorded!(2 jobs, in: db, for_call: "compute", in_registry: "reg001");
        assert_recorded!(1 job, in: db, with_comment: "sweep");
        assert_recorded!(1 job, in: db, with_status: JobStatus::Finished, done: true);
        assert_recorded!(0 jobs, in: db, for_call: "compute", done: true);
        assert_recorded!(3 jobs, in: db,);
    }
}
