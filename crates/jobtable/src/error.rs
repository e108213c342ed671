//! Error types for the job table engine.

use std::fmt;

use crate::column::ColumnId;
use crate::filter::MatchKind;
use crate::group::{GroupPath, SelectionKey};
use crate::job::JobId;

/// Which part of the row tree a fetch was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchScope {
    /// The outermost, paginated query. Failing here fails the whole view.
    TopLevel,
    /// The children of an expanded group.
    Group(GroupPath),
    /// Resolution of a selected row into affected jobs.
    Selection(SelectionKey),
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLevel => f.write_str("top level"),
            Self::Group(path) => write!(f, "group {path}"),
            Self::Selection(key) => write!(f, "selection {key}"),
        }
    }
}

/// Error reported by a fetch or mutation service.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The backend answered with an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend could not be reached.
    #[error("service unavailable")]
    Unavailable,
}

/// Errors surfaced by the table engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A flat or grouped query failed.
    ///
    /// Child-level failures carry a [`FetchScope::Group`] scope and are
    /// stored on the affected group row instead of being returned. Top-level
    /// failures and failures while resolving a selection are returned.
    #[error("fetch failed for {scope}: {source}")]
    FetchFailed {
        /// Where the fetch was issued.
        scope: FetchScope,
        /// The service error.
        #[source]
        source: FetchError,
    },

    /// An expand/collapse request broke the expansion invariant.
    ///
    /// This indicates a bug in the caller rather than a user error.
    #[error("invalid expansion path {path}: {reason}")]
    InvalidExpansionPath {
        /// The rejected path.
        path: GroupPath,
        /// Which precondition failed.
        reason: &'static str,
    },

    /// A bulk action succeeded for some jobs and failed for others.
    #[error("{} job(s) could not be updated ({succeeded} succeeded)", failed.len())]
    PartialMutationFailure {
        /// Failed job ids with the backend's reason.
        failed: Vec<(JobId, String)>,
        /// Number of jobs updated successfully.
        succeeded: usize,
    },

    /// A resolve finished after a newer table state was produced.
    ///
    /// Internal signal only; the result was dropped.
    #[error("resolve for generation {generation} discarded (current is {current})")]
    StaleResolveDiscarded {
        /// Generation the resolve was issued for.
        generation: u64,
        /// Generation of the current table state.
        current: u64,
    },

    /// The column is not in the catalog (or is an undeclared annotation).
    #[error("unknown column: {0}")]
    UnknownColumn(ColumnId),

    /// The column cannot be used as a grouping level.
    #[error("column {0} cannot be grouped")]
    NotGroupable(ColumnId),

    /// The column already appears in the grouping.
    #[error("column {0} is already grouped")]
    DuplicateGrouping(ColumnId),

    /// The column cannot be sorted on.
    #[error("column {0} cannot be sorted")]
    NotSortable(ColumnId),

    /// The column's filter kind does not accept the match kind.
    #[error("column {column} does not support {kind} filters")]
    UnsupportedMatch {
        /// Filtered column.
        column: ColumnId,
        /// Requested match kind.
        kind: MatchKind,
    },

    /// Page sizes must be positive.
    #[error("invalid page size: {0}")]
    InvalidPageSize(usize),
}

impl Error {
    /// Wraps a service error for the given scope.
    #[must_use]
    pub fn fetch(scope: FetchScope, source: FetchError) -> Self {
        Self::FetchFailed { scope, source }
    }
}

/// Result alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
