use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// Lifecycle state of a recorded job.
///
/// `Queued` is provisional and only ever set on the batch path; the external
/// sweep moves batch rows to a terminal state later. Rows produced by the
/// local executor are terminal from the moment they are written.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Finished,
    Error,
}

impl JobStatus {
    /// Whether this engine expects no further state change for the row.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobStatus::Queued => "queued",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        })
    }
}

/// Progress of a row's completion callback.
///
/// Absence of a `FinishState` on a row means no callback was named for it;
/// there is no in-band sentinel value.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishState {
    /// Named at launch, to be invoked later by the external sweep.
    Pending(String),
    /// Written just before the callback runs, so an interrupted run still
    /// leaves the row's terminal status on disk.
    Invoking(String),
    /// The callback returned.
    Invoked(String),
}

impl FinishState {
    /// The name of the completion callback this state refers to.
    pub fn callback(&self) -> &str {
        match self {
            FinishState::Pending(name)
            | FinishState::Invoking(name)
            | FinishState::Invoked(name) => name,
        }
    }
}

/// Elapsed wall time, persisted as `HH:MM:SS`.
///
/// Hours are not wrapped at 24: a two-day run prints as `48:00:00`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Walltime(Duration);

impl From<Duration> for Walltime {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Walltime {
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl Display for Walltime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.0.as_secs();
        write!(f, "{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("expected a `HH:MM:SS` walltime, got `{0}`")]
pub struct ParseWalltimeError(String);

impl FromStr for Walltime {
    type Err = ParseWalltimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseWalltimeError(s.to_owned());
        let mut fields = s.split(':');
        let (Some(hours), Some(minutes), Some(seconds), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(invalid());
        };
        let parse = |field: &str| field.parse::<u64>().map_err(|_| invalid());
        let (hours, minutes, seconds) = (parse(hours)?, parse(minutes)?, parse(seconds)?);
        if minutes > 59 || seconds > 59 {
            return Err(invalid());
        }
        Ok(Self(Duration::from_secs(hours * 3600 + minutes * 60 + seconds)))
    }
}

impl Serialize for Walltime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Walltime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One row of the job database: a single unit of work and everything the
/// engine knows about it.
///
/// Batch and local jobs share this schema; the mode only shows in which
/// optional fields are populated. `bjobid`/`registry`/`sjobid` are set by the
/// submission path, `mem_gb`/`walltime`/`error` only by the local executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Shared by every job launched in the same call.
    pub launched: DateTime<Utc>,
    /// Name of the target function.
    pub call: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bjobid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sjobid: Option<String>,
    pub status: JobStatus,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<FinishState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walltime: Option<Walltime>,
    /// Reserved for captured job output; never set by this engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// A freshly submitted batch row. `done` follows from the status, so the
    /// queued-implies-not-done invariant holds by construction.
    pub fn queued(id: JobId, launched: DateTime<Utc>, call: impl Into<String>) -> Self {
        Self {
            id,
            launched,
            call: call.into(),
            bjobid: None,
            registry: None,
            sjobid: None,
            status: JobStatus::Queued,
            done: false,
            finish: None,
            comment: None,
            mem_gb: None,
            walltime: None,
            log: None,
            error: None,
        }
    }

    /// A row for a locally executed rep. A captured fault makes the row an
    /// `Error` row; otherwise it is `Finished`. Either way it is `done`.
    pub fn completed(
        id: JobId,
        launched: DateTime<Utc>,
        call: impl Into<String>,
        error: Option<String>,
    ) -> Self {
        let status = match error {
            Some(_) => JobStatus::Error,
            None => JobStatus::Finished,
        };
        Self {
            status,
            done: true,
            error,
            ..Self::queued(id, launched, call)
        }
    }

    pub fn with_registry(self, registry: impl Into<String>) -> Self {
        Self {
            registry: Some(registry.into()),
            ..self
        }
    }

    /// Attach the handles returned by the submission adapter.
    pub fn with_submission(self, bjobid: i64, sjobid: impl Into<String>) -> Self {
        Self {
            bjobid: Some(bjobid),
            sjobid: Some(sjobid.into()),
            ..self
        }
    }

    pub fn with_comment(self, comment: Option<String>) -> Self {
        Self { comment, ..self }
    }

    pub fn with_finish(self, finish: Option<FinishState>) -> Self {
        Self { finish, ..self }
    }

    pub fn with_measurement(self, mem_gb: Option<f64>, walltime: Walltime) -> Self {
        Self {
            mem_gb,
            walltime: Some(walltime),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn walltime_formats_as_hh_mm_ss() {
        let walltime = Walltime::from(Duration::from_secs(3725));
        assert_eq!(walltime.to_string(), "01:02:05");
    }

    #[test]
    fn walltime_hours_do_not_wrap() {
        let walltime = Walltime::from(Duration::from_secs(30 * 3600 + 5));
        assert_eq!(walltime.to_string(), "30:00:05");
    }

    #[test]
    fn walltime_round_trips_through_display() {
        let walltime = Walltime::from(Duration::from_secs(7 * 3600 + 59 * 60 + 59));
        assert_eq!(walltime.to_string().parse(), Ok(walltime));
    }

    #[test]
    fn walltime_rejects_malformed_input() {
        assert_matches!("1:02".parse::<Walltime>(), Err(ParseWalltimeError(_)));
        assert_matches!("aa:bb:cc".parse::<Walltime>(), Err(ParseWalltimeError(_)));
        assert_matches!("00:61:00".parse::<Walltime>(), Err(ParseWalltimeError(_)));
        assert_matches!("00:00:00:00".parse::<Walltime>(), Err(ParseWalltimeError(_)));
    }

    #[test]
    fn queued_rows_are_not_done() {
        let job = Job::queued(1.into(), Utc::now(), "compute");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.done);
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn completed_rows_are_done_and_classified_by_fault() {
        let ok = Job::completed(1.into(), Utc::now(), "compute", None);
        assert_eq!(ok.status, JobStatus::Finished);
        assert!(ok.done);

        let faulted = Job::completed(2.into(), Utc::now(), "compute", Some("boom".to_owned()));
        assert_eq!(faulted.status, JobStatus::Error);
        assert!(faulted.done);
        assert_eq!(faulted.error.as_deref(), Some("boom"));
    }

    #[test]
    fn finish_state_serializes_readably() {
        let value = serde_json::to_value(FinishState::Invoking("record".to_owned())).unwrap();
        assert_eq!(value, serde_json::json!({ "invoking": "record" }));
    }

    #[test]
    fn job_row_round_trips_through_json() {
        let job = Job::completed(3.into(), Utc::now(), "compute", None)
            .with_comment(Some("variant 3".to_owned()))
            .with_measurement(Some(1.25), Walltime::from(Duration::from_secs(61)));
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn unset_optional_fields_are_omitted_from_the_row() {
        let encoded = serde_json::to_value(Job::queued(1.into(), Utc::now(), "compute")).unwrap();
        let object = encoded.as_object().unwrap();
        for absent in ["bjobid", "sjobid", "registry", "mem_gb", "walltime", "log", "error"] {
            assert!(!object.contains_key(absent), "{absent} should be omitted");
        }
    }
}
