//! In-memory implementation of the job services.
//!
//! Useful for tests, demos and the `jobq` command-line tool. By default it
//! behaves like a backend that avoids full counts: a windowed query reports
//! an exact total only once the window reaches the last matching row, and
//! "at least one more" otherwise.
//!
//! # Example
//!
//! ```rust
//! use jobtable::memory::InMemoryJobService;
//!
//! let service = InMemoryJobService::new(Vec::new()).exact_totals(true);
//! assert!(service.jobs().is_empty());
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::column::ColumnId;
use crate::error::FetchError;
use crate::filter::{Filter, matches_all};
use crate::group::GroupPath;
use crate::job::{Job, JobId};
use crate::service::{
    GroupCount, GroupFetcher, GroupOrderKey, GroupPage, GroupQuery, JobFetcher, JobMutator,
    JobPage, JobQuery, Mutation, MutationOutcome, PageWindow,
};
use crate::state::{Sort, SortDirection};
use crate::total::Total;

/// Counters of the calls a service has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// Flat job queries.
    pub job_queries: usize,
    /// Grouped aggregate queries.
    pub group_queries: usize,
    /// Mutation calls.
    pub mutations: usize,
}

/// Job services backed by a vector of jobs.
#[derive(Debug, Default)]
pub struct InMemoryJobService {
    jobs: RwLock<Vec<Job>>,
    exact_totals: bool,
    group_count_cap: Option<u64>,
    stats: Mutex<ServiceStats>,
}

impl InMemoryJobService {
    /// Creates a service over `jobs`.
    #[must_use]
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
            ..Self::default()
        }
    }

    /// Always report exact totals (builder pattern).
    #[must_use]
    pub fn exact_totals(mut self, exact: bool) -> Self {
        self.exact_totals = exact;
        self
    }

    /// Report group counts above `cap` as lower bounds (builder pattern).
    #[must_use]
    pub fn group_count_cap(mut self, cap: u64) -> Self {
        self.group_count_cap = Some(cap);
        self
    }

    /// Returns a snapshot of all jobs.
    #[must_use]
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    /// Looks up one job.
    #[must_use]
    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().iter().find(|j| &j.job_id == id).cloned()
    }

    /// Adds jobs.
    pub fn extend(&self, jobs: impl IntoIterator<Item = Job>) {
        self.jobs.write().extend(jobs);
    }

    /// Returns the call counters.
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        *self.stats.lock()
    }

    fn window_total(&self, len: usize, window: Option<PageWindow>) -> Total {
        match window {
            Some(w) if !self.exact_totals && w.skip.saturating_add(w.take) < len => {
                Total::AtLeast((w.skip + w.take + 1) as u64)
            }
            _ => Total::Exact(len as u64),
        }
    }

    fn group_total(&self, count: u64) -> Total {
        let cap = self.group_count_cap.unwrap_or(u64::MAX);
        Total::new(count.min(cap.saturating_add(1)), count <= cap)
    }
}

fn apply_window<T>(items: Vec<T>, window: Option<PageWindow>) -> Vec<T> {
    match window {
        Some(w) => items.into_iter().skip(w.skip).take(w.take).collect(),
        None => items,
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Typed comparison of two jobs on one column.
fn compare(column: &ColumnId, a: &Job, b: &Job) -> Ordering {
    match column {
        ColumnId::JobId => a.job_id.cmp(&b.job_id),
        ColumnId::Queue => a.queue.cmp(&b.queue),
        ColumnId::JobSet => a.job_set.cmp(&b.job_set),
        ColumnId::Owner => a.owner.cmp(&b.owner),
        ColumnId::State => a.state.cmp(&b.state),
        ColumnId::Priority => a.priority.cmp(&b.priority),
        ColumnId::Cpu => a.cpu.cmp(&b.cpu),
        ColumnId::Memory => a.memory.cmp(&b.memory),
        ColumnId::Gpu => a.gpu.cmp(&b.gpu),
        ColumnId::EphemeralStorage => a.ephemeral_storage.cmp(&b.ephemeral_storage),
        ColumnId::Submitted => a.submitted.cmp(&b.submitted),
        ColumnId::LastTransitionTime => a.last_transition_time.cmp(&b.last_transition_time),
        ColumnId::Annotation(name) => a.annotations.get(name).cmp(&b.annotations.get(name)),
    }
}

fn sort_jobs(jobs: &mut [Job], sort: &Sort) {
    jobs.sort_by(|a, b| {
        directed(
            compare(&sort.column, a, b).then_with(|| a.job_id.cmp(&b.job_id)),
            sort.direction,
        )
    });
}

fn scoped(filters: &[Filter], scope: &GroupPath) -> Vec<Filter> {
    let mut all = filters.to_vec();
    all.extend(scope.scope_filters());
    all
}

#[async_trait]
impl JobFetcher for InMemoryJobService {
    async fn query_jobs(&self, query: &JobQuery) -> Result<JobPage, FetchError> {
        self.stats.lock().job_queries += 1;
        let mut matched: Vec<Job> = self
            .jobs
            .read()
            .iter()
            .filter(|job| matches_all(&query.filters, job))
            .cloned()
            .collect();
        sort_jobs(&mut matched, &query.sort);

        let total = self.window_total(matched.len(), query.window);
        Ok(JobPage {
            jobs: apply_window(matched, query.window),
            total,
        })
    }
}

#[async_trait]
impl GroupFetcher for InMemoryJobService {
    async fn query_groups(&self, query: &GroupQuery) -> Result<GroupPage, FetchError> {
        self.stats.lock().group_queries += 1;
        let filters = scoped(&query.filters, &query.scope);

        let mut buckets: BTreeMap<String, GroupCount> = BTreeMap::new();
        for job in self.jobs.read().iter() {
            if !matches_all(&filters, job) {
                continue;
            }
            // Jobs without a value for the grouped column cannot be scoped
            // to a group, so they do not form one.
            let Some(value) = query.group_by.value_of(job) else {
                continue;
            };
            let bucket = buckets
                .entry(value.clone())
                .or_insert_with(|| GroupCount::new(value, Total::Exact(0)));
            bucket.count = Total::Exact(bucket.count.count() + 1);
            *bucket.state_counts.entry(job.state).or_default() += 1;
        }

        let mut groups: Vec<GroupCount> = buckets.into_values().collect();
        groups.sort_by(|a, b| {
            let ordering = match query.order.key {
                GroupOrderKey::Value => a.value.cmp(&b.value),
                GroupOrderKey::Count => a
                    .count
                    .count()
                    .cmp(&b.count.count())
                    .then_with(|| a.value.cmp(&b.value)),
            };
            directed(ordering, query.order.direction)
        });
        for group in &mut groups {
            group.count = self.group_total(group.count.count());
        }

        let total = self.window_total(groups.len(), query.window);
        Ok(GroupPage {
            groups: apply_window(groups, query.window),
            total,
        })
    }
}

#[async_trait]
impl JobMutator for InMemoryJobService {
    async fn apply(
        &self,
        ids: &[JobId],
        mutation: &Mutation,
    ) -> Result<BTreeMap<JobId, MutationOutcome>, FetchError> {
        self.stats.lock().mutations += 1;
        let mut jobs = self.jobs.write();
        let mut outcomes = BTreeMap::new();
        for id in ids {
            let outcome = match jobs.iter_mut().find(|j| &j.job_id == id) {
                None => MutationOutcome::Rejected("job not found".to_string()),
                Some(job) if job.state.is_terminal() => {
                    MutationOutcome::Rejected(format!("job is already {}", job.state))
                }
                Some(job) => {
                    match mutation {
                        Mutation::Cancel { .. } => {
                            job.state = crate::job::JobState::Cancelled;
                            job.last_transition_time = Utc::now();
                        }
                        Mutation::Reprioritize { priority } => job.priority = *priority,
                    }
                    MutationOutcome::Applied
                }
            };
            outcomes.insert(id.clone(), outcome);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use crate::service::GroupOrder;
    use chrono::DateTime;

    fn jobs() -> Vec<Job> {
        let at = DateTime::from_timestamp(0, 0).unwrap();
        vec![
            Job::new("a1", "alpha", "s1", at).with_state(JobState::Running),
            Job::new("a2", "alpha", "s1", at).with_state(JobState::Queued),
            Job::new("a3", "alpha", "s2", at).with_state(JobState::Succeeded),
            Job::new("b1", "beta", "s1", at)
                .with_state(JobState::Queued)
                .with_annotation("team", "infra"),
        ]
    }

    fn by_id() -> Sort {
        Sort::new(ColumnId::JobId, SortDirection::Ascending)
    }

    #[tokio::test]
    async fn flat_query_filters_sorts_and_windows() {
        let service = InMemoryJobService::new(jobs());
        let page = service
            .query_jobs(&JobQuery {
                filters: vec![Filter::exact(ColumnId::Queue, "alpha")],
                sort: Sort::new(ColumnId::JobId, SortDirection::Descending),
                window: Some(PageWindow::page(0, 2)),
            })
            .await
            .unwrap();
        let ids: Vec<_> = page.jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, ["a3", "a2"]);
        assert_eq!(page.total, Total::AtLeast(3));

        let last = service
            .query_jobs(&JobQuery {
                filters: vec![Filter::exact(ColumnId::Queue, "alpha")],
                sort: by_id(),
                window: Some(PageWindow::page(1, 2)),
            })
            .await
            .unwrap();
        assert_eq!(last.jobs.len(), 1);
        assert_eq!(last.total, Total::Exact(3));
    }

    #[tokio::test]
    async fn exact_totals_mode() {
        let service = InMemoryJobService::new(jobs()).exact_totals(true);
        let page = service
            .query_jobs(&JobQuery {
                filters: vec![],
                sort: by_id(),
                window: Some(PageWindow::page(0, 1)),
            })
            .await
            .unwrap();
        assert_eq!(page.total, Total::Exact(4));
    }

    #[tokio::test]
    async fn group_query_counts_per_value_and_state() {
        let service = InMemoryJobService::new(jobs());
        let page = service
            .query_groups(&GroupQuery {
                group_by: ColumnId::Queue,
                scope: GroupPath::root(),
                filters: vec![],
                order: GroupOrder {
                    key: GroupOrderKey::Count,
                    direction: SortDirection::Descending,
                },
                window: None,
            })
            .await
            .unwrap();
        assert_eq!(page.total, Total::Exact(2));
        assert_eq!(page.groups[0].value, "alpha");
        assert_eq!(page.groups[0].count, Total::Exact(3));
        assert_eq!(page.groups[0].state_counts[&JobState::Succeeded], 1);
        assert_eq!(page.groups[1].value, "beta");
    }

    #[tokio::test]
    async fn group_query_respects_scope_and_cap() {
        let service = InMemoryJobService::new(jobs()).group_count_cap(1);
        let page = service
            .query_groups(&GroupQuery {
                group_by: ColumnId::JobSet,
                scope: GroupPath::root().child(ColumnId::Queue, "alpha"),
                filters: vec![],
                order: GroupOrder {
                    key: GroupOrderKey::Value,
                    direction: SortDirection::Ascending,
                },
                window: None,
            })
            .await
            .unwrap();
        let values: Vec<_> = page.groups.iter().map(|g| g.value.as_str()).collect();
        assert_eq!(values, ["s1", "s2"]);
        assert_eq!(page.groups[0].count, Total::AtLeast(2));
        assert_eq!(page.groups[1].count, Total::Exact(1));
    }

    #[tokio::test]
    async fn jobs_without_annotation_are_not_grouped() {
        let service = InMemoryJobService::new(jobs());
        let page = service
            .query_groups(&GroupQuery {
                group_by: ColumnId::annotation("team"),
                scope: GroupPath::root(),
                filters: vec![],
                order: GroupOrder {
                    key: GroupOrderKey::Value,
                    direction: SortDirection::Ascending,
                },
                window: None,
            })
            .await
            .unwrap();
        assert_eq!(page.groups.len(), 1);
        assert_eq!(page.groups[0].value, "infra");
    }

    #[tokio::test]
    async fn mutations_report_per_job() {
        let service = InMemoryJobService::new(jobs());
        let ids = [JobId::new("a1"), JobId::new("a3"), JobId::new("zz")];
        let outcomes = service
            .apply(&ids, &Mutation::Cancel { reason: None })
            .await
            .unwrap();
        assert_eq!(outcomes[&JobId::new("a1")], MutationOutcome::Applied);
        assert!(matches!(outcomes[&JobId::new("a3")], MutationOutcome::Rejected(_)));
        assert!(matches!(outcomes[&JobId::new("zz")], MutationOutcome::Rejected(_)));
        assert_eq!(
            service.job(&JobId::new("a1")).unwrap().state,
            JobState::Cancelled
        );

        let outcomes = service
            .apply(&[JobId::new("a2")], &Mutation::Reprioritize { priority: 7 })
            .await
            .unwrap();
        assert_eq!(outcomes[&JobId::new("a2")], MutationOutcome::Applied);
        assert_eq!(service.job(&JobId::new("a2")).unwrap().priority, 7);
        assert_eq!(service.stats().mutations, 2);
    }
}
