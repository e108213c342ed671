//! Selection resolution and bulk actions.
//!
//! Selection keys are stored as-is in the table state; this module turns
//! them into the jobs they cover on demand. Group keys are scoped by their
//! path plus the table filters, and restricted to non-terminal jobs. Job keys
//! are passed through untouched and the mutation service reports any that
//! turned out terminal.
//!
//! Bulk actions are split into batches of
//! [`TableConfig::mutation_batch_size`] ids and report an outcome per job.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::column::ColumnId;
use crate::config::TableConfig;
use crate::error::{Error, FetchError, FetchScope, Result};
use crate::filter::Filter;
use crate::group::{GroupPath, SelectionKey};
use crate::job::{JobId, JobState};
use crate::service::{
    GroupOrder, GroupQuery, JobQuery, JobService, Mutation, MutationOutcome, PageWindow,
};
use crate::state::{Sort, SortDirection, TableState};
use crate::total::Total;

/// What a caller needs from a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Only the number of affected jobs, for a confirmation dialog.
    Count,
    /// The exact affected ids, for performing the action.
    Ids,
}

/// Jobs covered by a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffectedJobs {
    /// Exact number of distinct jobs.
    Count(u64),
    /// Distinct job ids, sorted.
    Ids(Vec<JobId>),
}

impl AffectedJobs {
    /// Number of affected jobs.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Count(n) => *n,
            Self::Ids(ids) => ids.len() as u64,
        }
    }

    /// Returns true if no job is affected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-job result of a bulk action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    /// The action that was applied.
    pub mutation: Mutation,
    /// Outcome for every targeted job.
    pub outcomes: BTreeMap<JobId, MutationOutcome>,
}

impl BulkReport {
    fn empty(mutation: Mutation) -> Self {
        Self {
            mutation,
            outcomes: BTreeMap::new(),
        }
    }

    /// Jobs the action was applied to.
    pub fn succeeded(&self) -> impl Iterator<Item = &JobId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| **o == MutationOutcome::Applied)
            .map(|(id, _)| id)
    }

    /// Jobs the action failed for, with the reason.
    #[must_use]
    pub fn failed(&self) -> Vec<(JobId, String)> {
        self.outcomes
            .iter()
            .filter_map(|(id, o)| match o {
                MutationOutcome::Rejected(reason) => Some((id.clone(), reason.clone())),
                MutationOutcome::Applied => None,
            })
            .collect()
    }

    /// Returns true if every targeted job was updated.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(|o| *o == MutationOutcome::Applied)
    }

    /// Converts a report with failures into
    /// [`Error::PartialMutationFailure`].
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failed();
        if failed.is_empty() {
            return Ok(self);
        }
        Err(Error::PartialMutationFailure {
            succeeded: self.outcomes.len() - failed.len(),
            failed,
        })
    }
}

/// Resolves selections and issues bulk actions.
#[derive(Debug)]
pub struct SelectionCoordinator<S: ?Sized> {
    service: Arc<S>,
    config: TableConfig,
}

impl<S: ?Sized> Clone for SelectionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            config: self.config.clone(),
        }
    }
}

impl<S> SelectionCoordinator<S>
where
    S: JobService + ?Sized,
{
    /// Creates a coordinator.
    pub fn new(service: Arc<S>, config: TableConfig) -> Self {
        Self { service, config }
    }

    /// Resolves `selection` in the context of `state`.
    pub async fn resolve_affected_jobs(
        &self,
        selection: &BTreeSet<SelectionKey>,
        state: &TableState,
        mode: ResolveMode,
    ) -> Result<AffectedJobs> {
        match mode {
            ResolveMode::Count => {
                let count = self.affected_count(selection, state).await?;
                Ok(AffectedJobs::Count(count))
            }
            ResolveMode::Ids => {
                let ids = self.affected_ids(selection, state).await?;
                Ok(AffectedJobs::Ids(ids))
            }
        }
    }

    /// Counts the distinct jobs covered by `selection`.
    ///
    /// Selections made only of groups are counted from per-state aggregates
    /// when the backend reports them exactly. Anything else enumerates ids.
    pub async fn affected_count(
        &self,
        selection: &BTreeSet<SelectionKey>,
        state: &TableState,
    ) -> Result<u64> {
        let groups_only = selection
            .iter()
            .all(|key| matches!(key, SelectionKey::Group(_)));
        if groups_only {
            let groups = outermost_groups(selection);
            let counts =
                try_join_all(groups.iter().map(|path| self.count_group(state, path))).await?;
            if let Some(total) = counts.into_iter().sum::<Option<u64>>() {
                debug!(groups = groups.len(), total, "counted selection from aggregates");
                return Ok(total);
            }
        }
        let ids = self.affected_ids(selection, state).await?;
        Ok(ids.len() as u64)
    }

    /// Lists the distinct jobs covered by `selection`, sorted by id.
    pub async fn affected_ids(
        &self,
        selection: &BTreeSet<SelectionKey>,
        state: &TableState,
    ) -> Result<Vec<JobId>> {
        let mut ids: BTreeSet<JobId> = selection
            .iter()
            .filter_map(|key| match key {
                SelectionKey::Job(id) => Some(id.clone()),
                SelectionKey::Group(_) => None,
            })
            .collect();

        let groups = outermost_groups(selection);
        let fetched = join_all(groups.iter().map(|path| self.group_ids(state, path))).await;
        for (path, result) in groups.iter().zip(fetched) {
            let group_ids = result.map_err(|source| {
                warn!(%path, %source, "failed to resolve selected group");
                Error::fetch(FetchScope::Selection(SelectionKey::Group(path.clone())), source)
            })?;
            ids.extend(group_ids);
        }
        Ok(ids.into_iter().collect())
    }

    /// Cancels every job covered by `selection`.
    pub async fn cancel(
        &self,
        selection: &BTreeSet<SelectionKey>,
        state: &TableState,
        reason: Option<String>,
    ) -> Result<BulkReport> {
        self.apply(selection, state, Mutation::Cancel { reason }).await
    }

    /// Changes the priority of every job covered by `selection`.
    pub async fn reprioritize(
        &self,
        selection: &BTreeSet<SelectionKey>,
        state: &TableState,
        priority: u32,
    ) -> Result<BulkReport> {
        self.apply(selection, state, Mutation::Reprioritize { priority })
            .await
    }

    /// Resolves `selection` and applies `mutation` to the result.
    ///
    /// Only a failure to resolve the selection is returned as an error.
    /// Mutation failures are reported per job in the [`BulkReport`].
    pub async fn apply(
        &self,
        selection: &BTreeSet<SelectionKey>,
        state: &TableState,
        mutation: Mutation,
    ) -> Result<BulkReport> {
        let ids = self.affected_ids(selection, state).await?;
        Ok(self.apply_to_ids(&ids, mutation).await)
    }

    /// Applies `mutation` to `ids` in batches.
    pub async fn apply_to_ids(&self, ids: &[JobId], mutation: Mutation) -> BulkReport {
        let mut report = BulkReport::empty(mutation);
        if ids.is_empty() {
            return report;
        }
        let batch_size = self.config.mutation_batch_size.max(1);
        info!(
            action = report.mutation.name(),
            jobs = ids.len(),
            batches = ids.len().div_ceil(batch_size),
            "applying bulk action"
        );

        for batch in ids.chunks(batch_size) {
            match self.service.apply(batch, &report.mutation).await {
                Ok(mut outcomes) => {
                    for id in batch {
                        let outcome = outcomes.remove(id).unwrap_or_else(|| {
                            MutationOutcome::Rejected("no outcome reported".to_string())
                        });
                        report.outcomes.insert(id.clone(), outcome);
                    }
                }
                Err(err) => {
                    warn!(
                        action = report.mutation.name(),
                        jobs = batch.len(),
                        %err,
                        "mutation batch failed"
                    );
                    for id in batch {
                        report
                            .outcomes
                            .insert(id.clone(), MutationOutcome::Rejected(err.to_string()));
                    }
                }
            }
        }

        let failed = report.outcomes.len() - report.succeeded().count();
        if failed > 0 {
            warn!(action = report.mutation.name(), failed, "bulk action partially failed");
        } else {
            info!(action = report.mutation.name(), jobs = ids.len(), "bulk action applied");
        }
        report
    }

    /// Filters selecting the actionable jobs under `path`.
    fn actionable_filters(state: &TableState, path: &GroupPath) -> Vec<Filter> {
        let mut filters = state.scoped_filters(path);
        filters.push(non_terminal_filter());
        filters
    }

    /// Exact number of actionable jobs under `path`, or `None` if the
    /// backend only reports a lower bound.
    async fn count_group(&self, state: &TableState, path: &GroupPath) -> Result<Option<u64>> {
        let mut filters = state.filters().to_vec();
        filters.push(non_terminal_filter());
        let page = self
            .service
            .query_groups(&GroupQuery {
                group_by: ColumnId::State,
                scope: path.clone(),
                filters,
                order: GroupOrder::for_sort(state.sort(), &ColumnId::State),
                window: None,
            })
            .await
            .map_err(|source| {
                Error::fetch(FetchScope::Selection(SelectionKey::Group(path.clone())), source)
            })?;

        let sum = page
            .groups
            .iter()
            .map(|g| g.count)
            .fold(Total::default(), Total::saturating_add);
        if !page.total.is_exact() || !sum.is_exact() {
            return Ok(None);
        }
        Ok(Some(sum.count()))
    }

    /// Enumerates the actionable job ids under `path`, one window at a time.
    async fn group_ids(
        &self,
        state: &TableState,
        path: &GroupPath,
    ) -> std::result::Result<Vec<JobId>, FetchError> {
        let take = self.config.max_jobs_per_request.max(1);
        let filters = Self::actionable_filters(state, path);
        let mut ids = Vec::new();
        let mut skip = 0;
        loop {
            let page = self
                .service
                .query_jobs(&JobQuery {
                    filters: filters.clone(),
                    sort: Sort::new(ColumnId::JobId, SortDirection::Ascending),
                    window: Some(PageWindow { skip, take }),
                })
                .await?;
            let fetched = page.jobs.len();
            ids.extend(page.jobs.into_iter().map(|job| job.job_id));
            skip += fetched;
            // A backend may return fewer rows than asked for; only an empty
            // window or a reached exact total ends the enumeration.
            let exhausted = page.total.is_exact() && skip as u64 >= page.total.count();
            if fetched == 0 || exhausted {
                break;
            }
        }
        debug!(%path, jobs = ids.len(), "enumerated selected group");
        Ok(ids)
    }
}

fn non_terminal_filter() -> Filter {
    Filter::any_of(ColumnId::State, JobState::non_terminal().map(JobState::as_str))
}

/// Selected group paths with no selected ancestor.
fn outermost_groups(selection: &BTreeSet<SelectionKey>) -> Vec<GroupPath> {
    let paths: Vec<&GroupPath> = selection
        .iter()
        .filter_map(|key| match key {
            SelectionKey::Group(path) => Some(path),
            SelectionKey::Job(_) => None,
        })
        .collect();
    paths
        .iter()
        .filter(|path| !paths.iter().any(|other| other.is_proper_prefix_of(path)))
        .map(|path| (*path).clone())
        .collect()
}
