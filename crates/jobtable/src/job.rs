//! Job records as produced by the fetch services.
//!
//! A [`Job`] is immutable from the engine's point of view: the table never
//! edits one in place, it asks the mutation service to act and then
//! re-fetches.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted and waiting for scheduling.
    Queued,
    /// Leased to an executor but not yet started.
    Leased,
    /// Scheduled, waiting for its pod to start.
    Pending,
    /// Running on an executor.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled by a user.
    Cancelled,
    /// Evicted by a higher-priority job.
    Preempted,
    /// Refused at submission time.
    Rejected,
}

impl JobState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 9] = [
        Self::Queued,
        Self::Leased,
        Self::Pending,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
        Self::Preempted,
        Self::Rejected,
    ];

    /// Returns the wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Leased => "LEASED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Preempted => "PREEMPTED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Returns true once no further mutation of the job is meaningful.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Preempted | Self::Rejected
        )
    }

    /// States a bulk cancel or reprioritize may act on.
    pub fn non_terminal() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(|s| !s.is_terminal())
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown job state name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown job state: {0:?}")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseJobStateError(s.to_string()))
    }
}

/// A job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier.
    pub job_id: JobId,
    /// Queue the job was submitted to.
    pub queue: String,
    /// Job set the job belongs to.
    pub job_set: String,
    /// Submitting user.
    #[serde(default)]
    pub owner: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Scheduling priority (lower runs first).
    #[serde(default)]
    pub priority: u32,
    /// CPU request in millicores.
    #[serde(default)]
    pub cpu: u64,
    /// Memory request in bytes.
    #[serde(default)]
    pub memory: u64,
    /// GPU request.
    #[serde(default)]
    pub gpu: u32,
    /// Ephemeral storage request in bytes.
    #[serde(default)]
    pub ephemeral_storage: u64,
    /// Submission time.
    pub submitted: DateTime<Utc>,
    /// Time of the last state transition.
    pub last_transition_time: DateTime<Utc>,
    /// User-supplied annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Job {
    /// Creates a queued job with zero resource requests, submitted at `at`.
    pub fn new(
        job_id: impl Into<JobId>,
        queue: impl Into<String>,
        job_set: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            queue: queue.into(),
            job_set: job_set.into(),
            owner: String::new(),
            state: JobState::Queued,
            priority: 0,
            cpu: 0,
            memory: 0,
            gpu: 0,
            ephemeral_storage: 0,
            submitted: at,
            last_transition_time: at,
            annotations: BTreeMap::new(),
        }
    }

    /// Sets the state (builder pattern).
    #[must_use]
    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    /// Sets the owner (builder pattern).
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Sets the priority (builder pattern).
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds an annotation (builder pattern).
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}
