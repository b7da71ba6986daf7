//! The batch submission path: the adapter contract and registry naming.
//!
//! The engine never talks to a cluster workload manager itself. It obtains a
//! registry name, drives an externally provided [`BatchAdapter`] through its
//! create → map → submit sequence, and records one queued row per handle the
//! adapter returns. Everything scheduler-specific, including the submission
//! script template, is configuration of the adapter.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::Walltime;
use crate::params::{Args, ParamTable};
use crate::store::StoreError;

/// Resource requests passed through verbatim to the submission adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walltime: Option<Walltime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_gb: Option<f64>,
    /// Where the scheduler should write the job's output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
}

impl Resources {
    pub fn with_walltime(self, walltime: Walltime) -> Self {
        Self {
            walltime: Some(walltime),
            ..self
        }
    }

    pub fn with_cpus(self, cpus: u32) -> Self {
        Self {
            cpus: Some(cpus),
            ..self
        }
    }

    pub fn with_mem_gb(self, mem_gb: f64) -> Self {
        Self {
            mem_gb: Some(mem_gb),
            ..self
        }
    }

    pub fn with_log(self, log: impl Into<PathBuf>) -> Self {
        Self {
            log: Some(log.into()),
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch submission is not supported by this launcher")]
    Unsupported,
    #[error("the submission adapter failed: {0}")]
    Adapter(String),
    #[error("error preparing the submission registry")]
    Io(#[from] std::io::Error),
}

/// The contract of the remote submission adapter.
///
/// The engine drives the three steps in order, exactly once per batch launch,
/// and treats any error as fatal for the launch call: no rows are written for
/// a failed attempt. Whatever the adapter already did remotely is its own
/// concern.
pub trait BatchAdapter {
    /// Adapter-side state for one submission registry.
    type Registry;
    /// The mapped-but-not-yet-submitted call set.
    type JobSet;

    /// Set up the registry at `dir` (a fresh subdirectory of the registry
    /// root, named by the engine).
    fn create_registry(&self, dir: &Path) -> Result<Self::Registry, BatchError>;

    /// Map the target function over the parameter table, with `fixed`
    /// arguments merged into every call.
    fn map_call(
        &self,
        registry: &mut Self::Registry,
        call: &str,
        params: &ParamTable,
        fixed: &Args,
    ) -> Result<Self::JobSet, BatchError>;

    /// Hand the mapped set to the scheduler. Must yield one handle per
    /// parameter row, in row order.
    fn submit(
        &self,
        registry: &mut Self::Registry,
        jobs: Self::JobSet,
        resources: &Resources,
    ) -> Result<SubmittedJobSet, BatchError>;
}

/// Per-job handles returned by a successful submission.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubmittedJob {
    /// Index of the job within the submission adapter.
    pub bjobid: i64,
    /// Id assigned by the remote scheduler.
    pub sjobid: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubmittedJobSet {
    pub jobs: Vec<SubmittedJob>,
}

impl SubmittedJobSet {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Adapter for deployments that only ever run locally; every submission
/// attempt is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdapter;

impl BatchAdapter for NoAdapter {
    type Registry = ();
    type JobSet = ();

    fn create_registry(&self, _dir: &Path) -> Result<Self::Registry, BatchError> {
        Err(BatchError::Unsupported)
    }

    fn map_call(
        &self,
        _registry: &mut Self::Registry,
        _call: &str,
        _params: &ParamTable,
        _fixed: &Args,
    ) -> Result<Self::JobSet, BatchError> {
        Err(BatchError::Unsupported)
    }

    fn submit(
        &self,
        _registry: &mut Self::Registry,
        _jobs: Self::JobSet,
        _resources: &Resources,
    ) -> Result<SubmittedJobSet, BatchError> {
        Err(BatchError::Unsupported)
    }
}

/// Next sequential registry name under `root`, creating `root` (and parents)
/// first. Names stay monotonic even when earlier registries were deleted.
pub(crate) fn next_registry_name(root: &Path) -> Result<String, StoreError> {
    fs::create_dir_all(root)?;
    let mut last = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(number) = entry.file_name().to_str().and_then(registry_number) {
            last = last.max(number);
        }
    }
    Ok(format!("reg{:03}", last + 1))
}

fn registry_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("reg")?;
    if digits.len() != 3 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// A scripted adapter: accepts whatever it is given and fabricates
    /// per-job handles, with an optional submission failure for fault tests.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedAdapter {
        pub(crate) fail_on_submit: bool,
    }

    impl BatchAdapter for ScriptedAdapter {
        type Registry = PathBuf;
        type JobSet = usize;

        fn create_registry(&self, dir: &Path) -> Result<Self::Registry, BatchError> {
            fs::create_dir_all(dir)?;
            Ok(dir.to_path_buf())
        }

        fn map_call(
            &self,
            _registry: &mut Self::Registry,
            _call: &str,
            params: &ParamTable,
            _fixed: &Args,
        ) -> Result<Self::JobSet, BatchError> {
            Ok(params.len())
        }

        fn submit(
            &self,
            _registry: &mut Self::Registry,
            jobs: Self::JobSet,
            _resources: &Resources,
        ) -> Result<SubmittedJobSet, BatchError> {
            if self.fail_on_submit {
                return Err(BatchError::Adapter("scripted submission failure".to_owned()));
            }
            Ok(SubmittedJobSet {
                jobs: (1..=jobs as i64)
                    .map(|index| SubmittedJob {
                        bjobid: index,
                        sjobid: format!("s{index:04}"),
                    })
                    .collect(),
            })
        }
    }

    #[test]
    fn first_registry_is_reg001() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(next_registry_name(root.path()).unwrap(), "reg001");
    }

    #[test]
    fn registry_numbers_increase_past_gaps() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("reg001")).unwrap();
        fs::create_dir(root.path().join("reg017")).unwrap();
        assert_eq!(next_registry_name(root.path()).unwrap(), "reg018");
    }

    #[test]
    fn unrelated_entries_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("regabc")).unwrap();
        fs::create_dir(root.path().join("reg01")).unwrap();
        fs::create_dir(root.path().join("archive")).unwrap();
        fs::write(root.path().join("reg005"), b"a file, not a registry").unwrap();
        assert_eq!(next_registry_name(root.path()).unwrap(), "reg001");
    }

    #[test]
    fn missing_registry_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("work").join("registries");
        assert_eq!(next_registry_name(&nested).unwrap(), "reg001");
        assert!(nested.is_dir());
    }

    #[test]
    fn no_adapter_rejects_submission() {
        let adapter = NoAdapter;
        assert!(matches!(
            adapter.create_registry(Path::new("anywhere")),
            Err(BatchError::Unsupported)
        ));
    }
}
