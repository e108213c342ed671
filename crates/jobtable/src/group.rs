//! Group paths and selection keys.
//!
//! Expansion and selection are addressed by derived keys rather than by row
//! position, so they survive re-fetching and URL round-trips. A group path's
//! text form percent-encodes every column key and value, which leaves the
//! `:` and `/` delimiters unambiguous.

use std::fmt;
use std::str::FromStr;

use crate::column::ColumnId;
use crate::filter::Filter;
use crate::job::JobId;

const PAIR_DELIMITER: char = ':';
const SEGMENT_DELIMITER: char = '/';

/// Ordered `(column, value)` pairs from the outermost group to one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupPath(Vec<(ColumnId, String)>);

impl GroupPath {
    /// The empty path (the table root).
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from pairs.
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ColumnId, V)>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(c, v)| (c, v.into())).collect())
    }

    /// Returns a new path one level deeper.
    #[must_use]
    pub fn child(&self, column: ColumnId, value: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push((column, value.into()));
        Self(segments)
    }

    /// Returns the path one level up, or `None` for a top-level or root path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Number of levels in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The `(column, value)` pairs.
    #[must_use]
    pub fn segments(&self) -> &[(ColumnId, String)] {
        &self.0
    }

    /// Iterates over the grouping columns along the path.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnId> {
        self.0.iter().map(|(c, _)| c)
    }

    /// Returns true if `self` is a proper prefix of `other`.
    #[must_use]
    pub fn is_proper_prefix_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Returns true if the path's columns follow `grouping` level by level.
    #[must_use]
    pub fn follows(&self, grouping: &[ColumnId]) -> bool {
        self.0.len() <= grouping.len() && self.columns().zip(grouping).all(|(a, b)| a == b)
    }

    /// Exact-match filters that scope a query to this group.
    #[must_use]
    pub fn scope_filters(&self) -> Vec<Filter> {
        self.0
            .iter()
            .map(|(column, value)| Filter::exact(column.clone(), value.clone()))
            .collect()
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEGMENT_DELIMITER}")?;
            }
            write!(
                f,
                "{}{PAIR_DELIMITER}{}",
                urlencoding::encode(&column.to_string()),
                urlencoding::encode(value)
            )?;
        }
        Ok(())
    }
}

/// Error returned when a group path or selection key cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed key {input:?}: {reason}")]
pub struct ParseKeyError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl ParseKeyError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for GroupPath {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in s.split(SEGMENT_DELIMITER) {
            let (column, value) = segment
                .split_once(PAIR_DELIMITER)
                .ok_or_else(|| ParseKeyError::new(s, "segment without column delimiter"))?;
            let column = urlencoding::decode(column)
                .map_err(|_| ParseKeyError::new(s, "column is not valid UTF-8"))?;
            let value = urlencoding::decode(value)
                .map_err(|_| ParseKeyError::new(s, "value is not valid UTF-8"))?;
            let column = column
                .parse::<ColumnId>()
                .map_err(|_| ParseKeyError::new(s, "unknown column"))?;
            segments.push((column, value.into_owned()));
        }
        Ok(Self(segments))
    }
}

/// The addressable unit of row selection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectionKey {
    /// A single job row.
    Job(JobId),
    /// A group row.
    Group(GroupPath),
}

impl SelectionKey {
    /// Selection key for a job.
    pub fn job(id: impl Into<JobId>) -> Self {
        Self::Job(id.into())
    }
}

impl From<GroupPath> for SelectionKey {
    fn from(path: GroupPath) -> Self {
        Self::Group(path)
    }
}

impl From<JobId> for SelectionKey {
    fn from(id: JobId) -> Self {
        Self::Job(id)
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job(id) => write!(f, "job:{}", urlencoding::encode(id.as_str())),
            Self::Group(path) => write!(f, "group:{path}"),
        }
    }
}

impl FromStr for SelectionKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("job:") {
            let id = urlencoding::decode(id)
                .map_err(|_| ParseKeyError::new(s, "job id is not valid UTF-8"))?;
            if id.is_empty() {
                return Err(ParseKeyError::new(s, "empty job id"));
            }
            return Ok(Self::Job(JobId::new(id.into_owned())));
        }
        if let Some(path) = s.strip_prefix("group:") {
            let path = path.parse::<GroupPath>()?;
            if path.is_root() {
                return Err(ParseKeyError::new(s, "empty group path"));
            }
            return Ok(Self::Group(path));
        }
        Err(ParseKeyError::new(s, "expected job: or group: prefix"))
    }
}
