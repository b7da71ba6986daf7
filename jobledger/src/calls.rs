//! Late-bound dispatch to user-supplied functions.
//!
//! The launch surface refers to target functions and completion callbacks by
//! name; the names are resolved against a [`CallRegistry`] populated at
//! startup. A missing name is its own error kind, distinct from a fault
//! raised by the function once found.

use fxhash::FxHashMap;
use serde_json::Value;

use crate::job::{JobId, JobStatus};
use crate::params::Args;
use crate::LaunchError;

/// Errors raised by target functions and completion callbacks.
pub type CallError = Box<dyn std::error::Error + Send + Sync>;

/// A target function: receives the merged argument set of one job.
pub type CallFn = dyn Fn(&Args) -> Result<Value, CallError> + Send + Sync;

/// A completion callback: receives the id and final status of one job.
pub type CallbackFn = dyn Fn(JobId, JobStatus) -> Result<(), CallError> + Send + Sync;

/// The name → function tables used for launch-time dispatch.
#[derive(Default)]
pub struct CallRegistry {
    calls: FxHashMap<String, Box<CallFn>>,
    callbacks: FxHashMap<String, Box<CallbackFn>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target function under `name`. A later registration under
    /// the same name replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, call: F)
    where
        F: Fn(&Args) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.calls.insert(name.into(), Box::new(call));
    }

    /// Register a completion callback under `name`.
    pub fn register_callback<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(JobId, JobStatus) -> Result<(), CallError> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Box::new(callback));
    }

    pub(crate) fn call(&self, name: &str) -> Result<&CallFn, LaunchError> {
        self.calls
            .get(name)
            .map(|call| &**call)
            .ok_or_else(|| LaunchError::UnknownCall(name.to_owned()))
    }

    pub(crate) fn callback(&self, name: &str) -> Result<&CallbackFn, LaunchError> {
        self.callbacks
            .get(name)
            .map(|callback| &**callback)
            .ok_or_else(|| LaunchError::UnknownCallback(name.to_owned()))
    }
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRegistry")
            .field("calls", &self.calls.keys().collect::<Vec<_>>())
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn registered_call_is_invoked_with_its_arguments() {
        let mut registry = CallRegistry::new();
        registry.register("double", |args: &Args| {
            let n = args.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(2 * n))
        });

        let mut args = Args::new();
        args.insert("n".to_owned(), json!(21));
        let call = registry.call("double").unwrap();
        assert_eq!(call(&args).unwrap(), json!(42));
    }

    #[test]
    fn unknown_call_is_a_distinct_error() {
        let registry = CallRegistry::new();
        assert_matches!(registry.call("missing"), Err(LaunchError::UnknownCall(name)) => {
            assert_eq!(name, "missing");
        });
    }

    #[test]
    fn unknown_callback_is_a_distinct_error() {
        let registry = CallRegistry::new();
        assert_matches!(
            registry.callback("missing"),
            Err(LaunchError::UnknownCallback(_))
        );
    }
}
