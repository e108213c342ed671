//! End-to-end behaviour of the table orchestrator over the in-memory backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use jobtable::prelude::*;
use jobtable::service::{GroupPage, GroupQuery, JobPage, JobQuery};
use tokio::sync::Notify;

fn job(id: &str, queue: &str, state: JobState) -> Job {
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    Job::new(id, queue, "set", at).with_state(state)
}

fn sixty_jobs() -> Vec<Job> {
    (0..60)
        .map(|i| job(&format!("job-{i:02}"), "main", JobState::Queued))
        .collect()
}

/// 10 jobs over 3 queues: alpha has 3 queued and 2 running, beta 4 pending,
/// gamma 1 running.
fn grouped_jobs() -> Vec<Job> {
    let mut jobs = Vec::new();
    for i in 0..3 {
        jobs.push(job(&format!("a-q{i}"), "alpha", JobState::Queued));
    }
    for i in 0..2 {
        jobs.push(job(&format!("a-r{i}"), "alpha", JobState::Running));
    }
    for i in 0..4 {
        jobs.push(job(&format!("b-p{i}"), "beta", JobState::Pending));
    }
    jobs.push(job("g-r0", "gamma", JobState::Running));
    jobs
}

fn table(jobs: Vec<Job>) -> JobTable<InMemoryJobService> {
    JobTable::new(Arc::new(InMemoryJobService::new(jobs)), TableConfig::default())
}

fn queue(value: &str) -> GroupPath {
    GroupPath::root().child(ColumnId::Queue, value)
}

#[tokio::test]
async fn pagination_reports_lower_bound_until_last_page() {
    let service = Arc::new(InMemoryJobService::new(sixty_jobs()));
    let mut table = JobTable::from_query(
        service,
        TableConfig::default(),
        "sort[id]=jobId&sort[desc]=false",
    );
    let cmd = table.init();
    table.settle(cmd).await;

    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 50);
    assert_eq!(rows.rows[0].as_job().unwrap().job_id.as_str(), "job-00");
    assert_eq!(rows.summary().to_string(), "1–50 of more than 50");
    assert!(!rows.total.is_exact());

    table.dispatch(TableMsg::SetPage(1)).await.unwrap();
    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows.rows[0].as_job().unwrap().job_id.as_str(), "job-50");
    assert_eq!(rows.summary().to_string(), "51–60 of 60");
    assert_eq!(rows.total, Total::Exact(60));
    assert_eq!(table.query_string(), "page=1&sort[id]=jobId&sort[desc]=false");
}

#[tokio::test]
async fn grouping_shows_one_row_per_value_and_splices_expansions() {
    let mut table = table(grouped_jobs());
    table
        .dispatch(TableMsg::SetGrouping(vec![ColumnId::Queue]))
        .await
        .unwrap();
    assert_eq!(table.rows().unwrap().len(), 3);

    table
        .dispatch(TableMsg::ToggleExpand(queue("alpha")))
        .await
        .unwrap();
    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 3 + 5);
    assert_eq!(rows.top_level_len(), 3);
    assert!(rows.rows.iter().filter_map(RowNode::as_job).all(|j| j.queue == "alpha"));
}

#[tokio::test]
async fn nested_levels_add_their_own_rows() {
    let mut table = table(grouped_jobs());
    table
        .dispatch(TableMsg::SetGrouping(vec![ColumnId::Queue, ColumnId::State]))
        .await
        .unwrap();
    table
        .dispatch(TableMsg::ToggleExpand(queue("alpha")))
        .await
        .unwrap();
    // alpha splits into QUEUED and RUNNING.
    assert_eq!(table.rows().unwrap().len(), 3 + 2);

    let queued = queue("alpha").child(ColumnId::State, "QUEUED");
    table
        .dispatch(TableMsg::ToggleExpand(queued.clone()))
        .await
        .unwrap();
    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 3 + 2 + 3);

    let alpha = rows.group(&queue("alpha")).unwrap();
    let children: u64 = rows
        .rows
        .iter()
        .filter_map(RowNode::as_group)
        .filter(|g| g.depth == 1)
        .map(|g| g.count.count())
        .sum();
    assert_eq!(alpha.count, Total::Exact(children));
    assert_eq!(rows.group(&queued).unwrap().count, Total::Exact(3));

    // Collapsing the outer group drops the inner expansion too.
    table
        .dispatch(TableMsg::ToggleExpand(queue("alpha")))
        .await
        .unwrap();
    assert!(table.state().expanded().is_empty());
    assert_eq!(table.rows().unwrap().len(), 3);
}

#[tokio::test]
async fn filters_reset_to_first_page() {
    let mut table = table(sixty_jobs());
    table.dispatch(TableMsg::SetPage(1)).await.unwrap();
    assert_eq!(table.state().page(), 1);

    let filter = Filter::new(ColumnId::JobId, MatchKind::StartsWith, "job-1");
    table.dispatch(TableMsg::SetFilter(filter)).await.unwrap();
    assert_eq!(table.state().page(), 0);
    assert_eq!(table.rows().unwrap().len(), 10);

    table.dispatch(TableMsg::SetPage(1)).await.unwrap();
    table
        .dispatch(TableMsg::ClearFilter(ColumnId::JobId))
        .await
        .unwrap();
    assert_eq!(table.state().page(), 0);
    assert_eq!(table.rows().unwrap().len(), 50);
}

#[tokio::test]
async fn selection_survives_toggles_but_not_regrouping() {
    let mut table = table(grouped_jobs());
    table
        .dispatch(TableMsg::AddGrouping(ColumnId::Queue))
        .await
        .unwrap();

    let alpha = SelectionKey::Group(queue("alpha"));
    let beta = SelectionKey::Group(queue("beta"));
    for key in [alpha.clone(), beta.clone(), alpha.clone()] {
        table.dispatch(TableMsg::ToggleSelect(key)).await.unwrap();
    }
    assert_eq!(table.state().selected().len(), 1);
    assert!(table.state().is_selected(&beta));

    // A refetch keeps selection addressed by value.
    table.refresh().await;
    assert!(table.state().is_selected(&beta));

    table
        .dispatch(TableMsg::AddGrouping(ColumnId::State))
        .await
        .unwrap();
    assert!(table.state().selected().is_empty());
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let mut table = table(grouped_jobs());
    table
        .dispatch(TableMsg::SetGrouping(vec![ColumnId::Queue, ColumnId::State]))
        .await
        .unwrap();
    table
        .dispatch(TableMsg::ToggleExpand(queue("beta")))
        .await
        .unwrap();
    let state = table.state().clone();
    let rows = table.rows().unwrap().clone();

    table.dispatch(TableMsg::Refresh).await.unwrap();
    assert_eq!(table.state(), &state);
    assert_eq!(table.rows().unwrap(), &rows);
}

fn job_ids(table: &JobTable<InMemoryJobService>) -> Vec<&str> {
    table
        .rows()
        .unwrap()
        .rows
        .iter()
        .filter_map(RowNode::as_job)
        .map(|job| job.job_id.as_str())
        .collect()
}

#[tokio::test]
async fn owner_filter_and_priority_sort_use_job_fields() {
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let mut table = table(vec![
        Job::new("j1", "main", "set", at).with_owner("alice").with_priority(5),
        Job::new("j2", "main", "set", at).with_owner("bob").with_priority(1),
        Job::new("j3", "main", "set", at).with_owner("alice").with_priority(2),
    ]);
    table
        .dispatch(TableMsg::SetSort(Sort::new(
            ColumnId::Priority,
            SortDirection::Ascending,
        )))
        .await
        .unwrap();
    assert_eq!(job_ids(&table), ["j2", "j3", "j1"]);

    table
        .dispatch(TableMsg::SetFilter(Filter::exact(ColumnId::Owner, "alice")))
        .await
        .unwrap();
    assert_eq!(job_ids(&table), ["j3", "j1"]);
}

#[tokio::test]
async fn refresh_picks_up_new_jobs() {
    let service = Arc::new(InMemoryJobService::new(grouped_jobs()));
    let mut table = JobTable::new(Arc::clone(&service), TableConfig::default());
    table
        .dispatch(TableMsg::AddGrouping(ColumnId::Queue))
        .await
        .unwrap();
    assert_eq!(table.rows().unwrap().len(), 3);

    service.extend([job("d-q0", "delta", JobState::Queued)]);
    table.dispatch(TableMsg::Refresh).await.unwrap();
    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.group(&queue("delta")).unwrap().count, Total::Exact(1));
}

#[tokio::test]
async fn url_restores_expanded_view() {
    let mut table = table(grouped_jobs());
    table
        .dispatch(TableMsg::SetGrouping(vec![ColumnId::Queue, ColumnId::State]))
        .await
        .unwrap();
    table
        .dispatch(TableMsg::ToggleExpand(queue("alpha")))
        .await
        .unwrap();
    table
        .dispatch(TableMsg::OpenDetail(JobId::new("a-q1")))
        .await
        .unwrap();
    let query = table.query_string();

    let service = Arc::new(InMemoryJobService::new(grouped_jobs()));
    let mut restored = JobTable::from_query(service, TableConfig::default(), &query);
    let cmd = restored.init();
    restored.settle(cmd).await;
    assert_eq!(restored.state(), table.state());
    assert_eq!(restored.rows().unwrap().len(), table.rows().unwrap().len());
}

/// Blocks flat queries filtered on "slow" until released.
struct GatedService {
    inner: InMemoryJobService,
    gate: Notify,
}

#[async_trait]
impl JobFetcher for GatedService {
    async fn query_jobs(&self, query: &JobQuery) -> Result<JobPage, FetchError> {
        let slow = query
            .filters
            .iter()
            .any(|f| f.value == FilterValue::Text("slow".into()));
        if slow {
            self.gate.notified().await;
        }
        self.inner.query_jobs(query).await
    }
}

#[async_trait]
impl GroupFetcher for GatedService {
    async fn query_groups(&self, query: &GroupQuery) -> Result<GroupPage, FetchError> {
        self.inner.query_groups(query).await
    }
}

#[async_trait]
impl JobMutator for GatedService {
    async fn apply(
        &self,
        ids: &[JobId],
        mutation: &Mutation,
    ) -> Result<std::collections::BTreeMap<JobId, MutationOutcome>, FetchError> {
        self.inner.apply(ids, mutation).await
    }
}

#[tokio::test]
async fn superseded_resolve_never_reaches_the_view() {
    let service = Arc::new(GatedService {
        inner: InMemoryJobService::new(vec![
            job("slow-1", "slow", JobState::Queued),
            job("fast-1", "fast", JobState::Queued),
        ]),
        gate: Notify::new(),
    });
    let mut table = JobTable::new(Arc::clone(&service), TableConfig::default());

    let slow = table
        .update(TableMsg::SetFilter(Filter::exact(ColumnId::Queue, "slow")))
        .unwrap()
        .unwrap();
    let slow_generation = slow.generation();
    let slow_task = tokio::spawn(slow.run());

    table
        .dispatch(TableMsg::SetFilter(Filter::exact(ColumnId::Queue, "fast")))
        .await
        .unwrap();
    service.gate.notify_waiters();

    assert!(slow_task.await.unwrap().is_none());
    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.rows[0].as_job().unwrap().job_id.as_str(), "fast-1");
    assert!(table.generation() > slow_generation);
}

/// Fails grouped queries scoped to one path, or every flat query.
struct FlakyService {
    inner: InMemoryJobService,
    failing_scope: Option<GroupPath>,
}

#[async_trait]
impl JobFetcher for FlakyService {
    async fn query_jobs(&self, query: &JobQuery) -> Result<JobPage, FetchError> {
        if self.failing_scope.is_none() {
            return Err(FetchError::Backend("flat queries are down".into()));
        }
        self.inner.query_jobs(query).await
    }
}

#[async_trait]
impl GroupFetcher for FlakyService {
    async fn query_groups(&self, query: &GroupQuery) -> Result<GroupPage, FetchError> {
        if self.failing_scope.as_ref() == Some(&query.scope) {
            return Err(FetchError::Unavailable);
        }
        self.inner.query_groups(query).await
    }
}

#[async_trait]
impl JobMutator for FlakyService {
    async fn apply(
        &self,
        ids: &[JobId],
        mutation: &Mutation,
    ) -> Result<std::collections::BTreeMap<JobId, MutationOutcome>, FetchError> {
        self.inner.apply(ids, mutation).await
    }
}

#[tokio::test]
async fn failed_child_fetch_marks_only_its_group() {
    let service = Arc::new(FlakyService {
        inner: InMemoryJobService::new(grouped_jobs()),
        failing_scope: Some(queue("alpha")),
    });
    let mut table = JobTable::new(service, TableConfig::default());
    table
        .dispatch(TableMsg::SetGrouping(vec![ColumnId::Queue, ColumnId::State]))
        .await
        .unwrap();
    table
        .dispatch(TableMsg::ToggleExpand(queue("alpha")))
        .await
        .unwrap();
    table
        .dispatch(TableMsg::ToggleExpand(queue("beta")))
        .await
        .unwrap();

    let rows = table.rows().unwrap();
    assert_eq!(
        rows.group(&queue("alpha")).unwrap().error,
        Some(Error::fetch(
            FetchScope::Group(queue("alpha")),
            FetchError::Unavailable
        ))
    );
    assert!(rows.group(&queue("beta")).unwrap().error.is_none());
    // Three queues plus beta's single state group.
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn top_level_failure_shows_an_error_not_stale_rows() {
    let service = Arc::new(FlakyService {
        inner: InMemoryJobService::new(grouped_jobs()),
        failing_scope: None,
    });
    let mut table = JobTable::new(service, TableConfig::default());
    table
        .dispatch(TableMsg::AddGrouping(ColumnId::Queue))
        .await
        .unwrap();
    assert_eq!(table.rows().unwrap().len(), 3);

    table
        .dispatch(TableMsg::RemoveGrouping(ColumnId::Queue))
        .await
        .unwrap();
    assert!(table.rows().is_none());
    match table.view() {
        TableView::Failed(Error::FetchFailed { scope, .. }) => {
            assert_eq!(scope, &FetchScope::TopLevel);
        }
        other => panic!("expected a failed view, got {other:?}"),
    }
}

/// Group queries for `down` fail until it is cleared.
struct OutageService {
    inner: InMemoryJobService,
    down: parking_lot::Mutex<Option<GroupPath>>,
}

#[async_trait]
impl JobFetcher for OutageService {
    async fn query_jobs(&self, query: &JobQuery) -> Result<JobPage, FetchError> {
        self.inner.query_jobs(query).await
    }
}

#[async_trait]
impl GroupFetcher for OutageService {
    async fn query_groups(&self, query: &GroupQuery) -> Result<GroupPage, FetchError> {
        if self.down.lock().as_ref() == Some(&query.scope) {
            return Err(FetchError::Unavailable);
        }
        self.inner.query_groups(query).await
    }
}

#[async_trait]
impl JobMutator for OutageService {
    async fn apply(
        &self,
        ids: &[JobId],
        mutation: &Mutation,
    ) -> Result<std::collections::BTreeMap<JobId, MutationOutcome>, FetchError> {
        self.inner.apply(ids, mutation).await
    }
}

#[tokio::test]
async fn selection_under_a_failed_group_survives_until_it_reloads() {
    let service = Arc::new(OutageService {
        inner: InMemoryJobService::new(grouped_jobs()),
        down: parking_lot::Mutex::new(None),
    });
    let mut table = JobTable::new(Arc::clone(&service), TableConfig::default());
    let queued = queue("alpha").child(ColumnId::State, "QUEUED");
    table
        .dispatch(TableMsg::SetGrouping(vec![ColumnId::Queue, ColumnId::State]))
        .await
        .unwrap();
    for path in [queue("alpha"), queued.clone()] {
        table.dispatch(TableMsg::ToggleExpand(path)).await.unwrap();
    }
    let selected = [SelectionKey::Group(queued.clone()), SelectionKey::job("a-q0")];
    for key in &selected {
        table
            .dispatch(TableMsg::ToggleSelect(key.clone()))
            .await
            .unwrap();
    }
    assert_eq!(table.state().selected().len(), 2);

    *service.down.lock() = Some(queue("alpha"));
    table.refresh().await;
    let rows = table.rows().unwrap();
    assert!(rows.group(&queue("alpha")).unwrap().error.is_some());
    assert!(rows.group(&queued).is_none());
    assert!(selected.iter().all(|key| table.state().is_selected(key)));

    *service.down.lock() = None;
    table.refresh().await;
    assert!(table.rows().unwrap().group(&queued).is_some());
    assert!(selected.iter().all(|key| table.state().is_selected(key)));

    // Hidden rows are deselected.
    table.dispatch(TableMsg::CollapseAll).await.unwrap();
    assert!(table.state().selected().is_empty());
}
