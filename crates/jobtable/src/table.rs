//! The table orchestrator.
//!
//! [`JobTable`] owns the authoritative [`TableState`] and follows the Elm
//! Architecture: every user intent arrives as a [`TableMsg`], `update`
//! applies the matching reducer, and when the visible rows depend on the
//! change it returns a [`ResolveCmd`]. Running the command produces a
//! [`TableMsg::Resolved`] that is fed back through `update`.
//!
//! Each resolve carries the generation of the state it was issued for.
//! Issuing a new resolve cancels the previous one, and a result that arrives
//! for an older generation is discarded, so rows computed against an old
//! filter or grouping are never shown.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use jobtable::column::ColumnId;
//! use jobtable::config::TableConfig;
//! use jobtable::memory::InMemoryJobService;
//! use jobtable::table::{JobTable, TableMsg};
//!
//! # tokio_test_block_on(async {
//! let service = Arc::new(InMemoryJobService::new(Vec::new()));
//! let mut table = JobTable::new(service, TableConfig::default());
//! table.refresh().await;
//! table.dispatch(TableMsg::AddGrouping(ColumnId::Queue)).await.unwrap();
//! assert_eq!(table.query_string(), "g[0]=queue");
//! assert_eq!(table.rows().map(|rows| rows.len()), Some(0));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::column::{ColumnCatalog, ColumnId};
use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::group::{GroupPath, SelectionKey};
use crate::job::JobId;
use crate::query_params::QueryParamCodec;
use crate::resolver::{ResolvedRows, RowNode, RowResolver};
use crate::selection::{AffectedJobs, BulkReport, ResolveMode, SelectionCoordinator};
use crate::service::JobService;
use crate::state::{Sort, TableState};

/// A user intent or a completed resolve.
#[derive(Debug, Clone)]
pub enum TableMsg {
    /// Replace the grouping.
    SetGrouping(Vec<ColumnId>),
    /// Append one grouping level.
    AddGrouping(ColumnId),
    /// Remove a grouping level and everything nested inside it.
    RemoveGrouping(ColumnId),
    /// Expand or collapse a group.
    ToggleExpand(GroupPath),
    /// Collapse every group.
    CollapseAll,
    /// Add or replace a column filter.
    SetFilter(Filter),
    /// Remove a column filter.
    ClearFilter(ColumnId),
    /// Remove every filter.
    ClearFilters,
    /// Replace the sort.
    SetSort(Sort),
    /// Go to a page.
    SetPage(usize),
    /// Change the page size.
    SetPageSize(usize),
    /// Select or deselect a row.
    ToggleSelect(SelectionKey),
    /// Deselect everything.
    ClearSelection,
    /// Open a job's detail panel.
    OpenDetail(JobId),
    /// Close the detail panel.
    CloseDetail,
    /// Declare an annotation column.
    AddAnnotationColumn(String),
    /// Remove an annotation column.
    RemoveAnnotationColumn(String),
    /// Re-resolve the current state.
    Refresh,
    /// A resolve finished.
    Resolved(ResolveMsg),
}

/// Result of a [`ResolveCmd`].
#[derive(Debug, Clone)]
pub struct ResolveMsg {
    /// Generation of the state the rows were resolved for.
    pub generation: u64,
    /// The rows, or the top-level failure.
    pub result: Result<ResolvedRows>,
}

/// What the table currently shows.
#[derive(Debug, Clone, Default)]
pub enum TableView {
    /// A resolve for the current state is in flight.
    #[default]
    Loading,
    /// Rows for the current state.
    Ready(ResolvedRows),
    /// The top-level fetch for the current state failed.
    Failed(Error),
}

/// A pending resolve for one state generation.
///
/// The command is inert until [`run`](Self::run) is awaited.
pub struct ResolveCmd<S: ?Sized> {
    generation: u64,
    state: TableState,
    resolver: RowResolver<S>,
    token: CancellationToken,
}

impl<S: ?Sized> fmt::Debug for ResolveCmd<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveCmd")
            .field("generation", &self.generation)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S> ResolveCmd<S>
where
    S: JobService + ?Sized,
{
    /// Generation this resolve was issued for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs the resolve. Returns `None` if it was superseded before it
    /// finished.
    pub async fn run(self) -> Option<TableMsg> {
        let Self {
            generation,
            state,
            resolver,
            token,
        } = self;
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(generation, "resolve cancelled");
                None
            }
            result = resolver.resolve(&state) => {
                Some(TableMsg::Resolved(ResolveMsg { generation, result }))
            }
        }
    }
}

/// Owns the table state and keeps the displayed rows in step with it.
pub struct JobTable<S: ?Sized> {
    state: TableState,
    view: TableView,
    generation: u64,
    in_flight: Option<CancellationToken>,
    last_rows: Option<ResolvedRows>,
    codec: QueryParamCodec,
    resolver: RowResolver<S>,
    coordinator: SelectionCoordinator<S>,
}

impl<S> JobTable<S>
where
    S: JobService + ?Sized,
{
    /// Creates a table in its default state with the standard columns.
    pub fn new(service: Arc<S>, config: TableConfig) -> Self {
        Self::with_catalog(service, config, ColumnCatalog::standard())
    }

    /// Creates a table with a custom column catalog.
    pub fn with_catalog(service: Arc<S>, config: TableConfig, catalog: ColumnCatalog) -> Self {
        let state = TableState::from_config(&config);
        Self {
            state,
            view: TableView::Loading,
            generation: 0,
            in_flight: None,
            last_rows: None,
            resolver: RowResolver::new(Arc::clone(&service)),
            coordinator: SelectionCoordinator::new(service, config.clone()),
            codec: QueryParamCodec::new(catalog, config),
        }
    }

    /// Creates a table whose starting state is decoded from a URL query.
    pub fn from_query(service: Arc<S>, config: TableConfig, query: &str) -> Self {
        let mut table = Self::new(service, config);
        table.state = table.codec.decode(query);
        table
    }

    /// The command that loads the initial rows.
    pub fn init(&mut self) -> ResolveCmd<S> {
        self.start_resolve()
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &TableState {
        &self.state
    }

    /// What the table shows.
    #[must_use]
    pub fn view(&self) -> &TableView {
        &self.view
    }

    /// The rows, when the current state has been resolved.
    #[must_use]
    pub fn rows(&self) -> Option<&ResolvedRows> {
        match &self.view {
            TableView::Ready(rows) => Some(rows),
            _ => None,
        }
    }

    /// Generation of the current state.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The column catalog.
    #[must_use]
    pub fn catalog(&self) -> &ColumnCatalog {
        self.codec.catalog()
    }

    /// The current state as a URL query string.
    #[must_use]
    pub fn query_string(&self) -> String {
        self.codec.encode(&self.state)
    }

    /// Handles a message.
    ///
    /// Reducer errors leave the state untouched. When the change affects the
    /// visible rows, the in-flight resolve is cancelled and a new one is
    /// returned.
    pub fn update(&mut self, msg: TableMsg) -> Result<Option<ResolveCmd<S>>> {
        let catalog = self.codec.catalog();
        let state = &self.state;
        let next = match msg {
            TableMsg::Resolved(msg) => {
                self.on_resolved(msg);
                return Ok(None);
            }
            TableMsg::Refresh => return Ok(Some(self.start_resolve())),
            TableMsg::SetGrouping(grouping) => state.set_grouping(catalog, grouping)?,
            TableMsg::AddGrouping(column) => state.add_grouping(catalog, column)?,
            TableMsg::RemoveGrouping(column) => state.remove_grouping(catalog, &column)?,
            TableMsg::ToggleExpand(path) => state.toggle_expand(&path)?,
            TableMsg::CollapseAll => state.collapse_all(),
            TableMsg::SetFilter(filter) => state.set_filter(catalog, filter)?,
            TableMsg::ClearFilter(column) => state.clear_filter(&column),
            TableMsg::ClearFilters => state.clear_filters(),
            TableMsg::SetSort(sort) => state.set_sort(catalog, sort)?,
            TableMsg::SetPage(page) => state.set_page(page),
            TableMsg::SetPageSize(size) => state.set_page_size(size)?,
            TableMsg::ToggleSelect(key) => state.toggle_select(key),
            TableMsg::ClearSelection => state.clear_selection(),
            TableMsg::OpenDetail(id) => state.open_detail(id),
            TableMsg::CloseDetail => state.close_detail(),
            TableMsg::AddAnnotationColumn(name) => state.add_annotation_column(&name),
            TableMsg::RemoveAnnotationColumn(name) => state.remove_annotation_column(&name),
        };

        let refetch = affects_rows(&self.state, &next);
        self.state = next;
        Ok(refetch.then(|| self.start_resolve()))
    }

    /// Applies a resolve result if it belongs to the current generation.
    ///
    /// Results for older generations are rejected with
    /// [`Error::StaleResolveDiscarded`] and leave the table unchanged.
    ///
    /// Applying rows reconciles the selection with them: keys of rows that
    /// are no longer shown, such as rows on another page or under a
    /// collapsed group, are deselected. Keys under a group whose children
    /// failed to load are kept until that group loads again.
    pub fn apply_resolved(&mut self, msg: ResolveMsg) -> Result<()> {
        if msg.generation != self.generation {
            return Err(Error::StaleResolveDiscarded {
                generation: msg.generation,
                current: self.generation,
            });
        }
        self.in_flight = None;
        match msg.result {
            Ok(rows) => {
                self.reconcile_selection(&rows);
                self.view = TableView::Ready(rows);
            }
            Err(err) => {
                warn!(%err, generation = self.generation, "resolve failed");
                self.view = TableView::Failed(err);
            }
        }
        Ok(())
    }

    /// Runs a resolve command to completion and applies its result.
    pub async fn settle(&mut self, cmd: ResolveCmd<S>) {
        if let Some(TableMsg::Resolved(msg)) = cmd.run().await {
            self.on_resolved(msg);
        }
    }

    /// Handles a message and settles the resolve it triggers, if any.
    pub async fn dispatch(&mut self, msg: TableMsg) -> Result<()> {
        if let Some(cmd) = self.update(msg)? {
            self.settle(cmd).await;
        }
        Ok(())
    }

    /// Re-resolves the current state.
    pub async fn refresh(&mut self) {
        let cmd = self.start_resolve();
        self.settle(cmd).await;
    }

    /// Resolves the current selection for a confirmation dialog or action.
    pub async fn affected_jobs(&self, mode: ResolveMode) -> Result<AffectedJobs> {
        self.coordinator
            .resolve_affected_jobs(self.state.selected(), &self.state, mode)
            .await
    }

    /// Cancels the selected jobs.
    pub async fn cancel_selected(&self, reason: Option<String>) -> Result<BulkReport> {
        self.coordinator
            .cancel(self.state.selected(), &self.state, reason)
            .await
    }

    /// Reprioritizes the selected jobs.
    pub async fn reprioritize_selected(&self, priority: u32) -> Result<BulkReport> {
        self.coordinator
            .reprioritize(self.state.selected(), &self.state, priority)
            .await
    }

    /// The selection coordinator, for selections other than the table's.
    #[must_use]
    pub fn coordinator(&self) -> &SelectionCoordinator<S> {
        &self.coordinator
    }

    fn on_resolved(&mut self, msg: ResolveMsg) {
        if let Err(err) = self.apply_resolved(msg) {
            debug!(%err, "ignoring resolve result");
        }
    }

    fn reconcile_selection(&mut self, rows: &ResolvedRows) {
        let visible = rows.visible_keys();
        let errored: BTreeSet<GroupPath> = rows
            .rows
            .iter()
            .filter_map(RowNode::as_group)
            .filter(|g| g.error.is_some())
            .map(|g| g.path.clone())
            .collect();
        let stranded = self
            .last_rows
            .take()
            .map(|previous| keys_under(&previous, &errored))
            .unwrap_or_default();

        let before = self.state.selected().len();
        self.state = self.state.retain_selection(|key| {
            visible.contains(key)
                || stranded.contains(key)
                || matches!(key, SelectionKey::Group(path)
                    if errored.iter().any(|g| g.is_proper_prefix_of(path)))
        });
        let dropped = before - self.state.selected().len();
        if dropped > 0 {
            debug!(dropped, "dropped selection of rows no longer shown");
        }
    }

    fn start_resolve(&mut self) -> ResolveCmd<S> {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());
        if let TableView::Ready(rows) = std::mem::replace(&mut self.view, TableView::Loading) {
            self.last_rows = Some(rows);
        }
        debug!(generation = self.generation, "resolving rows");
        ResolveCmd {
            generation: self.generation,
            state: self.state.clone(),
            resolver: self.resolver.clone(),
            token,
        }
    }
}

/// Returns true if going from `prev` to `next` changes what the resolver
/// would fetch.
fn affects_rows(prev: &TableState, next: &TableState) -> bool {
    prev.grouping() != next.grouping()
        || prev.filters() != next.filters()
        || prev.sort() != next.sort()
        || prev.page() != next.page()
        || prev.page_size() != next.page_size()
        || prev.expanded() != next.expanded()
}

/// Keys of the rows in `rows` nested under any of `groups`.
fn keys_under(rows: &ResolvedRows, groups: &BTreeSet<GroupPath>) -> BTreeSet<SelectionKey> {
    let mut keys = BTreeSet::new();
    if groups.is_empty() {
        return keys;
    }
    let mut ancestors: Vec<&GroupPath> = Vec::new();
    for row in &rows.rows {
        ancestors.truncate(row.depth());
        if ancestors.iter().any(|a| groups.contains(*a)) {
            keys.insert(row.selection_key());
        }
        if let RowNode::Group(g) = row {
            ancestors.push(&g.path);
        }
    }
    keys
}

/// Selection keys of `rows` that are currently selected.
#[must_use]
pub fn selected_visible(rows: &ResolvedRows, state: &TableState) -> BTreeSet<SelectionKey> {
    rows.visible_keys()
        .into_iter()
        .filter(|key| state.is_selected(key))
        .collect()
}
