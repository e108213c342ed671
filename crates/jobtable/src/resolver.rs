//! Row tree resolution.
//!
//! [`RowResolver::resolve`] turns a [`TableState`] into the flattened rows of
//! the current page. The outermost level is a single paginated query. Every
//! expanded group is then resolved level by level: all expanded groups at one
//! depth are fetched concurrently, and their expanded children form the next
//! level of the work list. Children are fetched in full.
//!
//! A failed child fetch is recorded on its group row and does not affect
//! siblings. A failed outermost fetch fails the whole resolve.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::column::ColumnId;
use crate::error::{Error, FetchError, FetchScope, Result};
use crate::group::{GroupPath, SelectionKey};
use crate::job::{Job, JobState};
use crate::service::{GroupFetcher, GroupOrder, GroupQuery, JobFetcher, JobQuery, PageWindow};
use crate::state::TableState;
use crate::total::{PageSummary, Total};

/// A group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    /// Path from the outermost level to this group.
    pub path: GroupPath,
    /// Grouping column of this level.
    pub column: ColumnId,
    /// The group's value.
    pub value: String,
    /// Jobs in the group.
    pub count: Total,
    /// Jobs in the group per state.
    pub state_counts: BTreeMap<JobState, u64>,
    /// Nesting depth (0 for the outermost level).
    pub depth: usize,
    /// Whether the group is expanded.
    pub expanded: bool,
    /// Set when the group is expanded but its children could not be fetched.
    /// Always an [`Error::FetchFailed`] scoped to this group.
    pub error: Option<Error>,
}

/// A job row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    /// The job.
    pub job: Job,
    /// Nesting depth (equal to the grouping length).
    pub depth: usize,
}

/// One displayed row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowNode {
    /// An aggregate group.
    Group(GroupRow),
    /// A single job.
    Job(JobRow),
}

impl RowNode {
    /// Nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Group(g) => g.depth,
            Self::Job(j) => j.depth,
        }
    }

    /// The key selecting this row.
    #[must_use]
    pub fn selection_key(&self) -> SelectionKey {
        match self {
            Self::Group(g) => SelectionKey::Group(g.path.clone()),
            Self::Job(j) => SelectionKey::Job(j.job.job_id.clone()),
        }
    }

    /// The group row, if this is one.
    #[must_use]
    pub fn as_group(&self) -> Option<&GroupRow> {
        match self {
            Self::Group(g) => Some(g),
            Self::Job(_) => None,
        }
    }

    /// The job, if this is a job row.
    #[must_use]
    pub fn as_job(&self) -> Option<&Job> {
        match self {
            Self::Job(j) => Some(&j.job),
            Self::Group(_) => None,
        }
    }
}

/// The rows of one page, flattened in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRows {
    /// Rows in display order; children follow their parent.
    pub rows: Vec<RowNode>,
    /// Number of outermost rows across all pages.
    pub total: Total,
    /// Page the rows were resolved for.
    pub page: usize,
    /// Page size the rows were resolved for.
    pub page_size: usize,
}

impl ResolvedRows {
    /// Number of displayed rows, nested ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if nothing is displayed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of outermost rows on this page.
    #[must_use]
    pub fn top_level_len(&self) -> usize {
        self.rows.iter().filter(|r| r.depth() == 0).count()
    }

    /// The "first–last of total" summary for this page.
    #[must_use]
    pub fn summary(&self) -> PageSummary {
        PageSummary::new(self.page, self.page_size, self.top_level_len(), self.total)
    }

    /// Selection keys of every displayed row.
    #[must_use]
    pub fn visible_keys(&self) -> BTreeSet<SelectionKey> {
        self.rows.iter().map(RowNode::selection_key).collect()
    }

    /// Finds a group row by path.
    #[must_use]
    pub fn group(&self, path: &GroupPath) -> Option<&GroupRow> {
        self.rows
            .iter()
            .filter_map(RowNode::as_group)
            .find(|g| &g.path == path)
    }
}

/// Resolves table states into rows against a backend.
#[derive(Debug)]
pub struct RowResolver<S: ?Sized> {
    service: Arc<S>,
}

impl<S: ?Sized> Clone for RowResolver<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S> RowResolver<S>
where
    S: JobFetcher + GroupFetcher + ?Sized,
{
    /// Creates a resolver over `service`.
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// The backend.
    #[must_use]
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Resolves the rows of `state`'s current page.
    pub async fn resolve(&self, state: &TableState) -> Result<ResolvedRows> {
        let window = PageWindow::page(state.page(), state.page_size());
        let (top, total) = self
            .fetch_level(state, &GroupPath::root(), Some(window))
            .await
            .map_err(|source| {
                warn!(%source, "top-level fetch failed");
                Error::fetch(FetchScope::TopLevel, source)
            })?;

        let mut children: BTreeMap<GroupPath, std::result::Result<Vec<RowNode>, FetchError>> =
            BTreeMap::new();
        let mut frontier = expanded_groups(&top);
        while !frontier.is_empty() {
            let fetches = frontier.iter().map(|path| self.fetch_level(state, path, None));
            let results = join_all(fetches).await;

            let mut next = Vec::new();
            for (path, result) in frontier.into_iter().zip(results) {
                let result = result.map(|(rows, _)| rows);
                match &result {
                    Ok(rows) => next.extend(expanded_groups(rows)),
                    Err(err) => warn!(%path, %err, "child fetch failed"),
                }
                children.insert(path, result);
            }
            frontier = next;
        }

        let rows = flatten(top, children);
        debug!(rows = rows.len(), %total, page = state.page(), "resolved rows");
        Ok(ResolvedRows {
            rows,
            total,
            page: state.page(),
            page_size: state.page_size(),
        })
    }

    /// Fetches the rows directly under `scope`: groups of the next grouping
    /// level, or jobs once the grouping is exhausted.
    async fn fetch_level(
        &self,
        state: &TableState,
        scope: &GroupPath,
        window: Option<PageWindow>,
    ) -> std::result::Result<(Vec<RowNode>, Total), FetchError> {
        let depth = scope.depth();
        match state.grouping().get(depth) {
            Some(column) => {
                let page = self
                    .service
                    .query_groups(&GroupQuery {
                        group_by: column.clone(),
                        scope: scope.clone(),
                        filters: state.filters().to_vec(),
                        order: GroupOrder::for_sort(state.sort(), column),
                        window,
                    })
                    .await?;
                let rows = page
                    .groups
                    .into_iter()
                    .map(|group| {
                        let path = scope.child(column.clone(), group.value.clone());
                        RowNode::Group(GroupRow {
                            expanded: state.is_expanded(&path),
                            path,
                            column: column.clone(),
                            value: group.value,
                            count: group.count,
                            state_counts: group.state_counts,
                            depth,
                            error: None,
                        })
                    })
                    .collect();
                Ok((rows, page.total))
            }
            None => {
                let page = self
                    .service
                    .query_jobs(&JobQuery {
                        filters: state.scoped_filters(scope),
                        sort: state.sort().clone(),
                        window,
                    })
                    .await?;
                let rows = page
                    .jobs
                    .into_iter()
                    .map(|job| RowNode::Job(JobRow { job, depth }))
                    .collect();
                Ok((rows, page.total))
            }
        }
    }
}

fn expanded_groups(rows: &[RowNode]) -> Vec<GroupPath> {
    rows.iter()
        .filter_map(RowNode::as_group)
        .filter(|g| g.expanded)
        .map(|g| g.path.clone())
        .collect()
}

/// Splices fetched children after their parents, depth first.
fn flatten(
    top: Vec<RowNode>,
    mut children: BTreeMap<GroupPath, std::result::Result<Vec<RowNode>, FetchError>>,
) -> Vec<RowNode> {
    let mut out = Vec::with_capacity(top.len());
    let mut stack: Vec<RowNode> = top.into_iter().rev().collect();
    while let Some(mut node) = stack.pop() {
        let fetched = match &node {
            RowNode::Group(g) if g.expanded => children.remove(&g.path),
            _ => None,
        };
        match fetched {
            Some(Ok(rows)) => stack.extend(rows.into_iter().rev()),
            Some(Err(err)) => {
                if let RowNode::Group(g) = &mut node {
                    g.error = Some(Error::fetch(FetchScope::Group(g.path.clone()), err));
                }
            }
            None => {}
        }
        out.push(node);
    }
    out
}
