//! Table state and its reducers.
//!
//! [`TableState`] is the single source of truth for what the table shows:
//! grouping, filters, sort, pagination, expanded groups, selection and the
//! open detail panel. Every user intent maps to one reducer that takes the
//! current state and returns a new one. Reducers are pure: they never fetch
//! and never mutate `self`.
//!
//! # Example
//!
//! ```rust
//! use jobtable::column::{ColumnCatalog, ColumnId};
//! use jobtable::group::GroupPath;
//! use jobtable::state::TableState;
//!
//! let catalog = ColumnCatalog::standard();
//! let state = TableState::default()
//!     .set_grouping(&catalog, vec![ColumnId::Queue])
//!     .unwrap();
//!
//! let path = GroupPath::root().child(ColumnId::Queue, "research");
//! let state = state.toggle_expand(&path).unwrap();
//! assert!(state.is_expanded(&path));
//!
//! // Changing the grouping invalidates position-addressed state.
//! let state = state.set_grouping(&catalog, vec![ColumnId::State]).unwrap();
//! assert!(state.expanded().is_empty());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::column::{ColumnCatalog, ColumnId, ColumnSpec};
use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::group::{GroupPath, SelectionKey};
use crate::job::JobId;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    #[serde(rename = "asc")]
    Ascending,
    /// Largest first.
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    /// Returns the query-string name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            _ => Err(format!("unknown sort direction: {s:?}")),
        }
    }
}

/// The single active sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    /// Sort key.
    pub column: ColumnId,
    /// Direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Creates a sort.
    #[must_use]
    pub const fn new(column: ColumnId, direction: SortDirection) -> Self {
        Self { column, direction }
    }
}

/// The table's complete view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    pub(crate) grouping: Vec<ColumnId>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) sort: Sort,
    pub(crate) page: usize,
    pub(crate) page_size: usize,
    pub(crate) expanded: BTreeSet<GroupPath>,
    pub(crate) selected: BTreeSet<SelectionKey>,
    pub(crate) detail: Option<JobId>,
    pub(crate) annotation_columns: Vec<String>,
}

impl Default for TableState {
    fn default() -> Self {
        Self::from_config(&TableConfig::default())
    }
}

impl TableState {
    /// Creates an ungrouped, unfiltered state on page 0.
    #[must_use]
    pub fn new(page_size: usize, sort: Sort) -> Self {
        Self {
            grouping: Vec::new(),
            filters: Vec::new(),
            sort,
            page: 0,
            page_size: page_size.max(1),
            expanded: BTreeSet::new(),
            selected: BTreeSet::new(),
            detail: None,
            annotation_columns: Vec::new(),
        }
    }

    /// Creates the default state for a configuration.
    #[must_use]
    pub fn from_config(config: &TableConfig) -> Self {
        Self::new(config.default_page_size, config.default_sort.clone())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Grouping columns, outermost first.
    #[must_use]
    pub fn grouping(&self) -> &[ColumnId] {
        &self.grouping
    }

    /// Active filters in the order they were added.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The filter on `column`, if any.
    #[must_use]
    pub fn filter_for(&self, column: &ColumnId) -> Option<&Filter> {
        self.filters.iter().find(|f| &f.column == column)
    }

    /// The active sort.
    #[must_use]
    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Current page (0-indexed).
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Rows per page at the outermost level.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Expanded group paths.
    #[must_use]
    pub fn expanded(&self) -> &BTreeSet<GroupPath> {
        &self.expanded
    }

    /// Returns whether a group is expanded.
    #[must_use]
    pub fn is_expanded(&self, path: &GroupPath) -> bool {
        self.expanded.contains(path)
    }

    /// Selected rows.
    #[must_use]
    pub fn selected(&self) -> &BTreeSet<SelectionKey> {
        &self.selected
    }

    /// Returns whether a row is selected.
    #[must_use]
    pub fn is_selected(&self, key: &SelectionKey) -> bool {
        self.selected.contains(key)
    }

    /// Job whose detail panel is open.
    #[must_use]
    pub fn detail(&self) -> Option<&JobId> {
        self.detail.as_ref()
    }

    /// User-added annotation column names.
    #[must_use]
    pub fn annotation_columns(&self) -> &[String] {
        &self.annotation_columns
    }

    /// Filters for a query scoped to `scope`: the table's filters plus an
    /// exact match per level of the path.
    #[must_use]
    pub fn scoped_filters(&self, scope: &GroupPath) -> Vec<Filter> {
        let mut filters = self.filters.clone();
        filters.extend(scope.scope_filters());
        filters
    }

    /// Returns true if every expanded path follows the grouping and has its
    /// parent expanded.
    #[must_use]
    pub fn expansion_is_monotonic(&self) -> bool {
        self.expanded.iter().all(|path| {
            !path.is_root()
                && path.follows(&self.grouping)
                && path.parent().is_none_or(|parent| self.expanded.contains(&parent))
        })
    }

    fn column_spec(&self, catalog: &ColumnCatalog, id: &ColumnId) -> Result<ColumnSpec> {
        catalog
            .resolve(id, &self.annotation_columns)
            .ok_or_else(|| Error::UnknownColumn(id.clone()))
    }

    // ------------------------------------------------------------------
    // Grouping
    // ------------------------------------------------------------------

    /// Replaces the grouping sequence.
    ///
    /// Any actual change clears expansion and selection and returns to page
    /// 0. Setting the same sequence again is a no-op.
    pub fn set_grouping(&self, catalog: &ColumnCatalog, grouping: Vec<ColumnId>) -> Result<Self> {
        for (i, column) in grouping.iter().enumerate() {
            if !self.column_spec(catalog, column)?.groupable {
                return Err(Error::NotGroupable(column.clone()));
            }
            if grouping[..i].contains(column) {
                return Err(Error::DuplicateGrouping(column.clone()));
            }
        }
        if grouping == self.grouping {
            return Ok(self.clone());
        }
        debug!(from = ?self.grouping, to = ?grouping, "grouping changed");
        let mut next = self.clone();
        next.grouping = grouping;
        next.expanded.clear();
        next.selected.clear();
        next.page = 0;
        Ok(next)
    }

    /// Appends one grouping level.
    pub fn add_grouping(&self, catalog: &ColumnCatalog, column: ColumnId) -> Result<Self> {
        let mut grouping = self.grouping.clone();
        grouping.push(column);
        self.set_grouping(catalog, grouping)
    }

    /// Removes a grouping level and every level nested inside it.
    pub fn remove_grouping(&self, catalog: &ColumnCatalog, column: &ColumnId) -> Result<Self> {
        match self.grouping.iter().position(|c| c == column) {
            Some(index) => self.set_grouping(catalog, self.grouping[..index].to_vec()),
            None => Ok(self.clone()),
        }
    }

    // ------------------------------------------------------------------
    // Expansion
    // ------------------------------------------------------------------

    /// Expands a collapsed group or collapses an expanded one.
    ///
    /// Collapsing also collapses every group nested under `path`. Expanding
    /// requires the path to follow the grouping and its parent to be
    /// expanded; anything else is rejected with
    /// [`Error::InvalidExpansionPath`].
    pub fn toggle_expand(&self, path: &GroupPath) -> Result<Self> {
        let mut next = self.clone();
        if next.expanded.remove(path) {
            next.expanded.retain(|p| !path.is_proper_prefix_of(p));
            return Ok(next);
        }

        let invalid = |reason: &'static str| {
            debug!(%path, reason, "rejected expansion");
            Err(Error::InvalidExpansionPath {
                path: path.clone(),
                reason,
            })
        };
        if path.is_root() {
            return invalid("the root cannot be expanded");
        }
        if !path.follows(&self.grouping) {
            return invalid("path does not follow the current grouping");
        }
        if let Some(parent) = path.parent() {
            if !self.expanded.contains(&parent) {
                return invalid("parent group is not expanded");
            }
        }
        next.expanded.insert(path.clone());
        Ok(next)
    }

    /// Collapses every group.
    #[must_use]
    pub fn collapse_all(&self) -> Self {
        let mut next = self.clone();
        next.expanded.clear();
        next
    }

    // ------------------------------------------------------------------
    // Filtering and sorting
    // ------------------------------------------------------------------

    /// Adds or replaces the filter for `filter.column`.
    ///
    /// An empty value clears the column's filter instead. Either way the
    /// table returns to page 0.
    pub fn set_filter(&self, catalog: &ColumnCatalog, filter: Filter) -> Result<Self> {
        if filter.value.is_empty() {
            return Ok(self.clear_filter(&filter.column));
        }
        let spec = self.column_spec(catalog, &filter.column)?;
        if !spec.filter.supports(filter.kind) {
            return Err(Error::UnsupportedMatch {
                column: filter.column,
                kind: filter.kind,
            });
        }
        let mut next = self.clone();
        match next.filters.iter_mut().find(|f| f.column == filter.column) {
            Some(existing) => *existing = filter,
            None => next.filters.push(filter),
        }
        next.page = 0;
        Ok(next)
    }

    /// Removes the filter on `column`, returning to page 0 if one existed.
    #[must_use]
    pub fn clear_filter(&self, column: &ColumnId) -> Self {
        let mut next = self.clone();
        let before = next.filters.len();
        next.filters.retain(|f| &f.column != column);
        if next.filters.len() != before {
            next.page = 0;
        }
        next
    }

    /// Removes every filter.
    #[must_use]
    pub fn clear_filters(&self) -> Self {
        let mut next = self.clone();
        if !next.filters.is_empty() {
            next.filters.clear();
            next.page = 0;
        }
        next
    }

    /// Replaces the sort. The page index is kept.
    pub fn set_sort(&self, catalog: &ColumnCatalog, sort: Sort) -> Result<Self> {
        if !self.column_spec(catalog, &sort.column)?.sortable {
            return Err(Error::NotSortable(sort.column));
        }
        let mut next = self.clone();
        next.sort = sort;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    /// Moves to `page`.
    #[must_use]
    pub fn set_page(&self, page: usize) -> Self {
        let mut next = self.clone();
        next.page = page;
        next
    }

    /// Changes the page size and returns to page 0.
    pub fn set_page_size(&self, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize(page_size));
        }
        let mut next = self.clone();
        next.page_size = page_size;
        next.page = 0;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Selection and detail
    // ------------------------------------------------------------------

    /// Selects an unselected row or deselects a selected one.
    #[must_use]
    pub fn toggle_select(&self, key: SelectionKey) -> Self {
        let mut next = self.clone();
        if !next.selected.remove(&key) {
            next.selected.insert(key);
        }
        next
    }

    /// Deselects everything.
    #[must_use]
    pub fn clear_selection(&self) -> Self {
        let mut next = self.clone();
        next.selected.clear();
        next
    }

    /// Keeps only the selection keys for which `keep` returns true.
    ///
    /// The table uses this after each resolve, so a selection does not
    /// follow rows onto another page.
    #[must_use]
    pub fn retain_selection(&self, mut keep: impl FnMut(&SelectionKey) -> bool) -> Self {
        let mut next = self.clone();
        next.selected.retain(|key| keep(key));
        next
    }

    /// Opens the detail panel for a job.
    #[must_use]
    pub fn open_detail(&self, job_id: JobId) -> Self {
        let mut next = self.clone();
        next.detail = Some(job_id);
        next
    }

    /// Closes the detail panel.
    #[must_use]
    pub fn close_detail(&self) -> Self {
        let mut next = self.clone();
        next.detail = None;
        next
    }

    // ------------------------------------------------------------------
    // Annotation columns
    // ------------------------------------------------------------------

    /// Declares an annotation column. Empty or already-declared names are
    /// ignored.
    #[must_use]
    pub fn add_annotation_column(&self, name: &str) -> Self {
        let mut next = self.clone();
        if !name.is_empty() && !next.annotation_columns.iter().any(|a| a == name) {
            next.annotation_columns.push(name.to_string());
        }
        next
    }

    /// Removes an annotation column together with any filter on it and any
    /// grouping level from it inwards. A sort on the column falls back to
    /// job id in the same direction.
    #[must_use]
    pub fn remove_annotation_column(&self, name: &str) -> Self {
        let id = ColumnId::annotation(name);
        let mut next = self.clear_filter(&id);
        next.annotation_columns.retain(|a| a != name);
        if next.sort.column == id {
            next.sort.column = ColumnId::JobId;
        }
        if let Some(index) = next.grouping.iter().position(|c| c == &id) {
            next.grouping.truncate(index);
            next.expanded.clear();
            next.selected.clear();
            next.page = 0;
        }
        next
    }
}
