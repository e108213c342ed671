//! Column metadata.
//!
//! Columns describe which job attributes can be displayed, grouped, filtered
//! and sorted. The standard columns are static; annotation columns are added
//! at runtime and keyed by annotation name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::filter::MatchKind;
use crate::job::{Job, JobState};

/// Prefix used by annotation column keys.
pub const ANNOTATION_PREFIX: &str = "annotation_";

/// Identifies a column by key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnId {
    /// Job identifier.
    JobId,
    /// Queue name.
    Queue,
    /// Job set name.
    JobSet,
    /// Submitting user.
    Owner,
    /// Lifecycle state.
    State,
    /// Scheduling priority.
    Priority,
    /// CPU request.
    Cpu,
    /// Memory request.
    Memory,
    /// GPU request.
    Gpu,
    /// Ephemeral storage request.
    EphemeralStorage,
    /// Submission time.
    Submitted,
    /// Time of the last state transition.
    LastTransitionTime,
    /// A user-added annotation column.
    Annotation(String),
}

impl ColumnId {
    /// The standard (non-annotation) columns in display order.
    pub const STANDARD: [Self; 12] = [
        Self::JobId,
        Self::Queue,
        Self::JobSet,
        Self::Owner,
        Self::State,
        Self::Priority,
        Self::Cpu,
        Self::Memory,
        Self::Gpu,
        Self::EphemeralStorage,
        Self::Submitted,
        Self::LastTransitionTime,
    ];

    /// Creates an annotation column id.
    pub fn annotation(name: impl Into<String>) -> Self {
        Self::Annotation(name.into())
    }

    /// Returns the key of a standard column, or `None` for annotations.
    #[must_use]
    pub const fn standard_key(&self) -> Option<&'static str> {
        Some(match self {
            Self::JobId => "jobId",
            Self::Queue => "queue",
            Self::JobSet => "jobSet",
            Self::Owner => "owner",
            Self::State => "state",
            Self::Priority => "priority",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Gpu => "gpu",
            Self::EphemeralStorage => "ephemeralStorage",
            Self::Submitted => "submitted",
            Self::LastTransitionTime => "lastTransitionTime",
            Self::Annotation(_) => return None,
        })
    }

    /// Returns the annotation name for annotation columns.
    #[must_use]
    pub fn annotation_name(&self) -> Option<&str> {
        match self {
            Self::Annotation(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the textual value of this column for `job`.
    ///
    /// Missing annotations yield `None`.
    #[must_use]
    pub fn value_of(&self, job: &Job) -> Option<String> {
        Some(match self {
            Self::JobId => job.job_id.to_string(),
            Self::Queue => job.queue.clone(),
            Self::JobSet => job.job_set.clone(),
            Self::Owner => job.owner.clone(),
            Self::State => job.state.to_string(),
            Self::Priority => job.priority.to_string(),
            Self::Cpu => job.cpu.to_string(),
            Self::Memory => job.memory.to_string(),
            Self::Gpu => job.gpu.to_string(),
            Self::EphemeralStorage => job.ephemeral_storage.to_string(),
            Self::Submitted => job.submitted.to_rfc3339(),
            Self::LastTransitionTime => job.last_transition_time.to_rfc3339(),
            Self::Annotation(name) => return job.annotations.get(name).cloned(),
        })
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.standard_key() {
            Some(key) => f.write_str(key),
            None => write!(f, "{ANNOTATION_PREFIX}{}", self.annotation_name().unwrap_or_default()),
        }
    }
}

/// Error returned when a column key is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown column key: {0:?}")]
pub struct ParseColumnError(pub String);

impl FromStr for ColumnId {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix(ANNOTATION_PREFIX) {
            if name.is_empty() {
                return Err(ParseColumnError(s.to_string()));
            }
            return Ok(Self::Annotation(name.to_string()));
        }
        Self::STANDARD
            .into_iter()
            .find(|id| id.standard_key() == Some(s))
            .ok_or_else(|| ParseColumnError(s.to_string()))
    }
}

impl Serialize for ColumnId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a column can be filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    /// Not filterable.
    None,
    /// Free text: exact, prefix or substring match.
    Text,
    /// Multi-select over a fixed set of options.
    Enum(Vec<String>),
}

impl FilterKind {
    /// Returns whether this filter kind accepts `kind`.
    #[must_use]
    pub fn supports(&self, kind: MatchKind) -> bool {
        match self {
            Self::None => false,
            Self::Text => matches!(
                kind,
                MatchKind::Exact | MatchKind::StartsWith | MatchKind::Contains
            ),
            Self::Enum(_) => matches!(kind, MatchKind::AnyOf | MatchKind::Exact),
        }
    }
}

/// Static description of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column key.
    pub id: ColumnId,
    /// Header label.
    pub label: String,
    /// Whether the column can be a grouping level.
    pub groupable: bool,
    /// Whether the column can be the sort key.
    pub sortable: bool,
    /// Filter support.
    pub filter: FilterKind,
}

impl ColumnSpec {
    /// Creates a display-only column.
    pub fn new(id: ColumnId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            groupable: false,
            sortable: false,
            filter: FilterKind::None,
        }
    }

    /// Marks the column groupable (builder pattern).
    #[must_use]
    pub fn groupable(mut self) -> Self {
        self.groupable = true;
        self
    }

    /// Marks the column sortable (builder pattern).
    #[must_use]
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Sets the filter kind (builder pattern).
    #[must_use]
    pub fn filter(mut self, filter: FilterKind) -> Self {
        self.filter = filter;
        self
    }

    /// Spec for a runtime annotation column.
    pub fn annotation(name: &str) -> Self {
        Self::new(ColumnId::annotation(name), name)
            .groupable()
            .filter(FilterKind::Text)
    }
}

/// The set of standard columns a table knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnCatalog {
    columns: Vec<ColumnSpec>,
}

impl Default for ColumnCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ColumnCatalog {
    /// Creates a catalog from explicit column specs.
    #[must_use]
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// The standard job columns.
    #[must_use]
    pub fn standard() -> Self {
        let states = JobState::ALL.iter().map(ToString::to_string).collect();
        Self::new(vec![
            ColumnSpec::new(ColumnId::JobId, "Job ID")
                .sortable()
                .filter(FilterKind::Text),
            ColumnSpec::new(ColumnId::Queue, "Queue")
                .groupable()
                .sortable()
                .filter(FilterKind::Text),
            ColumnSpec::new(ColumnId::JobSet, "Job Set")
                .groupable()
                .sortable()
                .filter(FilterKind::Text),
            ColumnSpec::new(ColumnId::Owner, "Owner")
                .groupable()
                .sortable()
                .filter(FilterKind::Text),
            ColumnSpec::new(ColumnId::State, "State")
                .groupable()
                .sortable()
                .filter(FilterKind::Enum(states)),
            ColumnSpec::new(ColumnId::Priority, "Priority")
                .sortable()
                .filter(FilterKind::Text),
            ColumnSpec::new(ColumnId::Cpu, "CPU").sortable(),
            ColumnSpec::new(ColumnId::Memory, "Memory").sortable(),
            ColumnSpec::new(ColumnId::Gpu, "GPU").sortable(),
            ColumnSpec::new(ColumnId::EphemeralStorage, "Ephemeral Storage").sortable(),
            ColumnSpec::new(ColumnId::Submitted, "Submitted").sortable(),
            ColumnSpec::new(ColumnId::LastTransitionTime, "Last State Change").sortable(),
        ])
    }

    /// Returns the static columns.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Looks up a column, treating annotation columns as known only when
    /// `annotations` lists their name.
    #[must_use]
    pub fn resolve(&self, id: &ColumnId, annotations: &[String]) -> Option<ColumnSpec> {
        if let Some(name) = id.annotation_name() {
            return annotations
                .iter()
                .any(|a| a == name)
                .then(|| ColumnSpec::annotation(name));
        }
        self.columns.iter().find(|c| &c.id == id).cloned()
    }
}
