//! Contracts for the services the engine talks to.
//!
//! The engine never touches a transport. It asks three capabilities for
//! data: a flat job query, a grouped aggregate query, and a mutation
//! endpoint. Implementations live outside the crate (plus the in-memory
//! one in [`crate::memory`]).

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::column::ColumnId;
use crate::error::FetchError;
use crate::filter::Filter;
use crate::group::GroupPath;
use crate::job::{Job, JobId, JobState};
use crate::state::{Sort, SortDirection};
use crate::total::Total;

/// A page window: skip `skip` rows, then take at most `take`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Rows to skip.
    pub skip: usize,
    /// Maximum rows to return.
    pub take: usize,
}

impl PageWindow {
    /// Window for a 0-indexed page of `size` rows.
    #[must_use]
    pub const fn page(index: usize, size: usize) -> Self {
        Self {
            skip: index.saturating_mul(size),
            take: size,
        }
    }
}

/// A flat job list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    /// Filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Ordering.
    pub sort: Sort,
    /// Window, or `None` for every matching job.
    pub window: Option<PageWindow>,
}

/// Result of a [`JobQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobPage {
    /// Jobs in the window, in query order.
    pub jobs: Vec<Job>,
    /// Number of jobs matching the filters.
    pub total: Total,
}

/// What groups are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupOrderKey {
    /// The grouped column's value.
    Value,
    /// The group's job count.
    Count,
}

/// Ordering of aggregate groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupOrder {
    /// Order key.
    pub key: GroupOrderKey,
    /// Direction.
    pub direction: SortDirection,
}

impl GroupOrder {
    /// Maps the table sort onto group ordering for `group_by`.
    ///
    /// Sorting by the grouped column orders groups by value; any other sort
    /// orders them by job count. The direction carries over.
    #[must_use]
    pub fn for_sort(sort: &Sort, group_by: &ColumnId) -> Self {
        let key = if &sort.column == group_by {
            GroupOrderKey::Value
        } else {
            GroupOrderKey::Count
        };
        Self {
            key,
            direction: sort.direction,
        }
    }
}

/// A grouped aggregate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupQuery {
    /// Column whose distinct values form the groups.
    pub group_by: ColumnId,
    /// Enclosing group; the query only counts jobs inside it.
    pub scope: GroupPath,
    /// Table filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Group ordering.
    pub order: GroupOrder,
    /// Window, or `None` for every group.
    pub window: Option<PageWindow>,
}

/// One aggregate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    /// The grouped column's value.
    pub value: String,
    /// Jobs in the group.
    pub count: Total,
    /// Jobs in the group per state.
    pub state_counts: BTreeMap<JobState, u64>,
}

impl GroupCount {
    /// Creates a group without a state breakdown.
    pub fn new(value: impl Into<String>, count: Total) -> Self {
        Self {
            value: value.into(),
            count,
            state_counts: BTreeMap::new(),
        }
    }
}

/// Result of a [`GroupQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPage {
    /// Groups in the window, in query order.
    pub groups: Vec<GroupCount>,
    /// Number of groups.
    pub total: Total,
}

/// A bulk change requested of the mutation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Cancel the jobs.
    Cancel {
        /// Optional reason recorded with the cancellation.
        reason: Option<String>,
    },
    /// Change the jobs' priority.
    Reprioritize {
        /// New priority.
        priority: u32,
    },
}

impl Mutation {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cancel { .. } => "cancel",
            Self::Reprioritize { .. } => "reprioritize",
        }
    }
}

/// What happened to one job in a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The change was applied.
    Applied,
    /// The backend refused the change for this job.
    Rejected(String),
}

/// Flat job list capability.
#[async_trait]
pub trait JobFetcher: Send + Sync {
    /// Runs a flat job query.
    async fn query_jobs(&self, query: &JobQuery) -> Result<JobPage, FetchError>;
}

/// Grouped aggregate capability.
#[async_trait]
pub trait GroupFetcher: Send + Sync {
    /// Runs a grouped aggregate query.
    async fn query_groups(&self, query: &GroupQuery) -> Result<GroupPage, FetchError>;
}

/// Mutation capability.
#[async_trait]
pub trait JobMutator: Send + Sync {
    /// Applies `mutation` to `ids`, reporting an outcome per id.
    ///
    /// An `Err` means the call as a whole failed and nothing is known about
    /// individual jobs.
    async fn apply(
        &self,
        ids: &[JobId],
        mutation: &Mutation,
    ) -> Result<BTreeMap<JobId, MutationOutcome>, FetchError>;
}

/// Everything the table needs from its backend.
pub trait JobService: JobFetcher + GroupFetcher + JobMutator {}

impl<T: JobFetcher + GroupFetcher + JobMutator + ?Sized> JobService for T {}
