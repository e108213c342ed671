//! Column filters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::column::ColumnId;
use crate::job::Job;

/// How a filter value is matched against a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    /// Whole value equality.
    Exact,
    /// Prefix match.
    StartsWith,
    /// Substring match.
    Contains,
    /// Value is one of a set.
    AnyOf,
}

impl MatchKind {
    /// Every match kind.
    pub const ALL: [Self; 4] = [Self::Exact, Self::StartsWith, Self::Contains, Self::AnyOf];

    /// Returns the query-string name of the match kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::StartsWith => "startsWith",
            Self::Contains => "contains",
            Self::AnyOf => "anyOf",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown match kind: {s:?}"))
    }
}

/// The value side of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A single text value.
    Text(String),
    /// A set of accepted values.
    Set(Vec<String>),
}

impl FilterValue {
    /// Returns true if the value matches nothing useful (empty text or set).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Set(values) => values.is_empty(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        Self::Set(values)
    }
}

/// A filter on one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Filtered column.
    pub column: ColumnId,
    /// Match kind.
    pub kind: MatchKind,
    /// Value to match.
    pub value: FilterValue,
}

impl Filter {
    /// Creates a filter.
    pub fn new(column: ColumnId, kind: MatchKind, value: impl Into<FilterValue>) -> Self {
        Self {
            column,
            kind,
            value: value.into(),
        }
    }

    /// Exact-match filter, used to scope queries to a group value.
    pub fn exact(column: ColumnId, value: impl Into<String>) -> Self {
        Self::new(column, MatchKind::Exact, FilterValue::Text(value.into()))
    }

    /// Set-membership filter.
    pub fn any_of<I, S>(column: ColumnId, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        Self::new(column, MatchKind::AnyOf, FilterValue::Set(values))
    }

    /// Evaluates the filter against a job.
    ///
    /// A job without a value for the column (a missing annotation) matches
    /// nothing.
    #[must_use]
    pub fn matches(&self, job: &Job) -> bool {
        let Some(actual) = self.column.value_of(job) else {
            return false;
        };
        match (&self.kind, &self.value) {
            (MatchKind::Exact, FilterValue::Text(v)) => actual == *v,
            (MatchKind::StartsWith, FilterValue::Text(v)) => actual.starts_with(v.as_str()),
            (MatchKind::Contains, FilterValue::Text(v)) => actual.contains(v.as_str()),
            (MatchKind::AnyOf, FilterValue::Set(values)) => values.iter().any(|v| *v == actual),
            (MatchKind::AnyOf, FilterValue::Text(v)) => actual == *v,
            (_, FilterValue::Set(values)) => values.iter().any(|v| *v == actual),
        }
    }
}

/// Returns true if `job` satisfies every filter.
#[must_use]
pub fn matches_all(filters: &[Filter], job: &Job) -> bool {
    filters.iter().all(|f| f.matches(job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use chrono::DateTime;

    fn job() -> Job {
        Job::new("job-42", "research", "nightly", DateTime::from_timestamp(0, 0).unwrap())
            .with_state(JobState::Running)
            .with_annotation("team", "vision")
    }

    #[test]
    fn text_matches() {
        let j = job();
        assert!(Filter::exact(ColumnId::Queue, "research").matches(&j));
        assert!(!Filter::exact(ColumnId::Queue, "res").matches(&j));
        assert!(Filter::new(ColumnId::Queue, MatchKind::StartsWith, "res").matches(&j));
        assert!(Filter::new(ColumnId::JobSet, MatchKind::Contains, "ght").matches(&j));
        assert!(!Filter::new(ColumnId::JobSet, MatchKind::Contains, "day").matches(&j));
    }

    #[test]
    fn any_of_matches() {
        let j = job();
        assert!(Filter::any_of(ColumnId::State, ["QUEUED", "RUNNING"]).matches(&j));
        assert!(!Filter::any_of(ColumnId::State, ["SUCCEEDED"]).matches(&j));
        assert!(!Filter::any_of(ColumnId::State, Vec::<String>::new()).matches(&j));
    }

    #[test]
    fn missing_annotation_never_matches() {
        let j = job();
        assert!(Filter::exact(ColumnId::annotation("team"), "vision").matches(&j));
        assert!(!Filter::new(ColumnId::annotation("owner"), MatchKind::Contains, "").matches(&j));
    }

    #[test]
    fn match_kind_names() {
        for kind in MatchKind::ALL {
            assert_eq!(kind.as_str().parse::<MatchKind>().unwrap(), kind);
        }
        assert!("regex".parse::<MatchKind>().is_err());
    }

    #[test]
    fn empty_values() {
        assert!(FilterValue::from("").is_empty());
        assert!(FilterValue::Set(vec![]).is_empty());
        assert!(!FilterValue::from("x").is_empty());
    }
}
