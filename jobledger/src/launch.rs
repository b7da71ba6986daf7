//! The launch call: one builder describing what to run, how often, and where.

use std::path::PathBuf;

use serde_json::Value;

use crate::batch::Resources;
use crate::params::{Args, Reps};

/// Which execution path a launch takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Synchronously, in the calling process.
    Local,
    /// Via the submission adapter, grouped under a fresh registry below
    /// `regdir`.
    Batch { regdir: PathBuf },
}

/// A parameterized launch of one target function.
///
/// ```
/// use jobledger::prelude::*;
/// use serde_json::json;
///
/// let launch = Launch::call("compute")
///     .with_reps(json!([{ "x": 1 }, { "x": 2 }]))
///     .with_comment("first sweep")
///     .batch("registries");
/// ```
#[derive(Debug, Clone)]
pub struct Launch {
    pub(crate) call: String,
    pub(crate) reps: Reps,
    pub(crate) argname: String,
    pub(crate) moreargs: Args,
    pub(crate) resources: Resources,
    pub(crate) mode: Mode,
    pub(crate) comment: Option<String>,
    pub(crate) finish: Option<String>,
}

impl Launch {
    /// Column name assigned to unnamed repetition input.
    pub const DEFAULT_ARGNAME: &'static str = "arg";

    /// Start describing a launch of the registered function `name`. Without
    /// further repetition input the function runs once, locally, with a null
    /// argument.
    pub fn call(name: impl Into<String>) -> Self {
        Self {
            call: name.into(),
            reps: Reps::Value(Value::Null),
            argname: Self::DEFAULT_ARGNAME.to_owned(),
            moreargs: Args::new(),
            resources: Resources::default(),
            mode: Mode::Local,
            comment: None,
            finish: None,
        }
    }

    /// The repetition specification: one job per entry.
    pub fn with_reps(self, reps: impl Into<Reps>) -> Self {
        Self {
            reps: reps.into(),
            ..self
        }
    }

    /// Name used for the varying argument when the reps carry no names.
    pub fn with_argname(self, argname: impl Into<String>) -> Self {
        Self {
            argname: argname.into(),
            ..self
        }
    }

    /// Add one fixed argument merged into every call.
    pub fn with_arg(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut moreargs = self.moreargs;
        moreargs.insert(name.into(), value.into());
        Self { moreargs, ..self }
    }

    /// Fixed arguments merged into every call.
    pub fn with_more_args(self, moreargs: Args) -> Self {
        Self { moreargs, ..self }
    }

    /// Resource requests handed through to the submission adapter.
    pub fn with_resources(self, resources: Resources) -> Self {
        Self { resources, ..self }
    }

    /// Free-text annotation recorded on every row of this launch.
    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..self
        }
    }

    /// Name of the completion callback to invoke with each job's id and
    /// final status. Not naming one means no callback runs.
    pub fn on_finish(self, callback: impl Into<String>) -> Self {
        Self {
            finish: Some(callback.into()),
            ..self
        }
    }

    /// Run in the calling process, blocking until every rep completed.
    pub fn local(self) -> Self {
        Self {
            mode: Mode::Local,
            ..self
        }
    }

    /// Submit through the batch adapter, storing the submission registry
    /// under `regdir`.
    pub fn batch(self, regdir: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Batch {
                regdir: regdir.into(),
            },
            ..self
        }
    }
}
