//! Query-string codec for [`TableState`].
//!
//! Every structural field lives in its own parameter namespace:
//!
//! | parameter            | field                                        |
//! |----------------------|----------------------------------------------|
//! | `page`               | page index                                   |
//! | `ps`                 | page size                                    |
//! | `sort[id]`           | sort column                                  |
//! | `sort[desc]`         | `true` for descending                        |
//! | `ac[i]`              | annotation column names, in order            |
//! | `g[i]`               | grouping columns, outermost first            |
//! | `f[i][id]`           | filter column                                |
//! | `f[i][match]`        | filter match kind                            |
//! | `f[i][value]`        | text filter value                            |
//! | `f[i][value][j]`     | set filter values                            |
//! | `e[i]`               | expanded group paths                         |
//! | `sb`                 | job whose detail panel is open               |
//!
//! Parameters equal to their default are omitted. Decoding fails closed:
//! unknown parameters and fragments that do not make sense for the catalog
//! are skipped. Selection is not part of the URL.
//!
//! # Example
//!
//! ```rust
//! use jobtable::column::{ColumnCatalog, ColumnId};
//! use jobtable::config::TableConfig;
//! use jobtable::query_params::QueryParamCodec;
//! use jobtable::state::TableState;
//!
//! let codec = QueryParamCodec::new(ColumnCatalog::standard(), TableConfig::default());
//! let state = TableState::default()
//!     .set_grouping(codec.catalog(), vec![ColumnId::Queue])
//!     .unwrap();
//!
//! let query = codec.encode(&state);
//! assert_eq!(query, "g[0]=queue");
//! assert_eq!(codec.decode(&query), state);
//! ```

use std::collections::BTreeMap;

use tracing::trace;

use crate::column::{ColumnCatalog, ColumnId};
use crate::config::TableConfig;
use crate::filter::{Filter, FilterValue, MatchKind};
use crate::group::GroupPath;
use crate::job::JobId;
use crate::state::{Sort, SortDirection, TableState};

/// Encodes and decodes table state to and from URL query strings.
#[derive(Debug, Clone, Default)]
pub struct QueryParamCodec {
    catalog: ColumnCatalog,
    config: TableConfig,
}

impl QueryParamCodec {
    /// Creates a codec for a column catalog and its defaults.
    #[must_use]
    pub fn new(catalog: ColumnCatalog, config: TableConfig) -> Self {
        Self { catalog, config }
    }

    /// The column catalog decoded states are validated against.
    #[must_use]
    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    /// The defaults omitted parameters fall back to.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Serializes the URL-visible part of `state`.
    #[must_use]
    pub fn encode(&self, state: &TableState) -> String {
        let mut out = QueryWriter::default();

        if state.page() != 0 {
            out.push("page", &state.page().to_string());
        }
        if state.page_size() != self.config.default_page_size {
            out.push("ps", &state.page_size().to_string());
        }
        if state.sort() != &self.config.default_sort {
            out.push("sort[id]", &state.sort().column.to_string());
            let desc = state.sort().direction == SortDirection::Descending;
            out.push("sort[desc]", if desc { "true" } else { "false" });
        }
        for (i, name) in state.annotation_columns().iter().enumerate() {
            out.push(&format!("ac[{i}]"), name);
        }
        for (i, column) in state.grouping().iter().enumerate() {
            out.push(&format!("g[{i}]"), &column.to_string());
        }
        for (i, filter) in state.filters().iter().enumerate() {
            out.push(&format!("f[{i}][id]"), &filter.column.to_string());
            out.push(&format!("f[{i}][match]"), filter.kind.as_str());
            match &filter.value {
                FilterValue::Text(value) => out.push(&format!("f[{i}][value]"), value),
                FilterValue::Set(values) => {
                    for (j, value) in values.iter().enumerate() {
                        out.push(&format!("f[{i}][value][{j}]"), value);
                    }
                }
            }
        }
        for (i, path) in state.expanded().iter().enumerate() {
            out.push(&format!("e[{i}]"), &path.to_string());
        }
        if let Some(id) = state.detail() {
            out.push("sb", id.as_str());
        }

        out.finish()
    }

    /// Parses a query string (with or without a leading `?`) into a state.
    ///
    /// Each recognised fragment is applied through the matching reducer, so
    /// the result always satisfies the state invariants. Fragments the
    /// reducers reject are dropped.
    #[must_use]
    pub fn decode(&self, query: &str) -> TableState {
        let params = RawParams::parse(query);
        let mut state = TableState::from_config(&self.config);

        for name in params.annotation_columns.values() {
            state = state.add_annotation_column(name);
        }

        for key in params.grouping.values() {
            let Ok(column) = key.parse::<ColumnId>() else {
                trace!(key, "ignoring unknown grouping column");
                continue;
            };
            match state.add_grouping(&self.catalog, column) {
                Ok(next) => state = next,
                Err(err) => trace!(%err, "ignoring grouping column"),
            }
        }

        for raw in params.filters.values() {
            let Some(filter) = raw.to_filter() else {
                trace!(?raw, "ignoring malformed filter");
                continue;
            };
            if state.filter_for(&filter.column).is_some() {
                trace!(column = %filter.column, "ignoring repeated filter");
                continue;
            }
            match state.set_filter(&self.catalog, filter) {
                Ok(next) => state = next,
                Err(err) => trace!(%err, "ignoring filter"),
            }
        }

        if params.sort_id.is_some() || params.sort_desc.is_some() {
            let column = params
                .sort_id
                .as_deref()
                .and_then(|key| key.parse::<ColumnId>().ok())
                .unwrap_or_else(|| self.config.default_sort.column.clone());
            let direction = match params.sort_desc.as_deref() {
                Some("true") => SortDirection::Descending,
                Some("false") => SortDirection::Ascending,
                _ => self.config.default_sort.direction,
            };
            match state.set_sort(&self.catalog, Sort::new(column, direction)) {
                Ok(next) => state = next,
                Err(err) => trace!(%err, "ignoring sort"),
            }
        }

        let mut paths: Vec<GroupPath> = params
            .expanded
            .values()
            .filter_map(|text| match text.parse::<GroupPath>() {
                Ok(path) => Some(path),
                Err(err) => {
                    trace!(%err, "ignoring expansion");
                    None
                }
            })
            .collect();
        // Parents must be expanded before their children.
        paths.sort_by_key(GroupPath::depth);
        for path in paths {
            if state.is_expanded(&path) {
                continue;
            }
            match state.toggle_expand(&path) {
                Ok(next) => state = next,
                Err(err) => trace!(%err, "ignoring expansion"),
            }
        }

        if let Some(size) = params.page_size.as_deref() {
            match size.parse::<usize>() {
                Ok(size) => match state.set_page_size(size) {
                    Ok(next) => state = next,
                    Err(err) => trace!(%err, "ignoring page size"),
                },
                Err(_) => trace!(size, "ignoring page size"),
            }
        }
        if let Some(page) = params.page.as_deref() {
            match page.parse::<usize>() {
                Ok(page) => state = state.set_page(page),
                Err(_) => trace!(page, "ignoring page"),
            }
        }

        if let Some(id) = params.detail {
            state = state.open_detail(JobId::new(id));
        }

        state
    }
}

#[derive(Default)]
struct QueryWriter {
    parts: Vec<String>,
}

impl QueryWriter {
    fn push(&mut self, key: &str, value: &str) {
        self.parts
            .push(format!("{key}={}", urlencoding::encode(value)));
    }

    fn finish(self) -> String {
        self.parts.join("&")
    }
}

/// One filter as it appears in the query string, before validation.
#[derive(Debug, Default)]
struct RawFilter {
    id: Option<String>,
    kind: Option<String>,
    value: Option<String>,
    values: BTreeMap<usize, String>,
}

impl RawFilter {
    fn to_filter(&self) -> Option<Filter> {
        let column = self.id.as_deref()?.parse::<ColumnId>().ok()?;
        let kind = self.kind.as_deref()?.parse::<MatchKind>().ok()?;
        let value = if self.values.is_empty() {
            FilterValue::Text(self.value.clone()?)
        } else {
            FilterValue::Set(self.values.values().cloned().collect())
        };
        Some(Filter::new(column, kind, value))
    }
}

/// Query parameters sorted into their namespaces.
#[derive(Debug, Default)]
struct RawParams {
    page: Option<String>,
    page_size: Option<String>,
    sort_id: Option<String>,
    sort_desc: Option<String>,
    annotation_columns: BTreeMap<usize, String>,
    grouping: BTreeMap<usize, String>,
    filters: BTreeMap<usize, RawFilter>,
    expanded: BTreeMap<usize, String>,
    detail: Option<String>,
}

impl RawParams {
    fn parse(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let (Some(key), Some(value)) = (decode_component(key), decode_component(value)) else {
                trace!(pair, "ignoring undecodable parameter");
                continue;
            };
            if !params.accept(&key, value) {
                trace!(key, "ignoring unknown parameter");
            }
        }
        params
    }

    fn accept(&mut self, key: &str, value: String) -> bool {
        let Some((name, indices)) = split_key(key) else {
            return false;
        };
        let first_index = || indices.first().and_then(|i| i.parse::<usize>().ok());
        match (name, indices.as_slice()) {
            ("page", []) => self.page = Some(value),
            ("ps", []) => self.page_size = Some(value),
            ("sb", []) => self.detail = Some(value),
            ("sort", ["id"]) => self.sort_id = Some(value),
            ("sort", ["desc"]) => self.sort_desc = Some(value),
            ("ac", [_]) => return insert_indexed(&mut self.annotation_columns, first_index(), value),
            ("g", [_]) => return insert_indexed(&mut self.grouping, first_index(), value),
            ("e", [_]) => return insert_indexed(&mut self.expanded, first_index(), value),
            ("f", [_, field, rest @ ..]) => {
                let Some(index) = first_index() else {
                    return false;
                };
                let filter = self.filters.entry(index).or_default();
                match (*field, rest) {
                    ("id", []) => filter.id = Some(value),
                    ("match", []) => filter.kind = Some(value),
                    ("value", []) => filter.value = Some(value),
                    ("value", [j]) => match j.parse::<usize>() {
                        Ok(j) => {
                            filter.values.entry(j).or_insert(value);
                        }
                        Err(_) => return false,
                    },
                    _ => return false,
                }
            }
            _ => return false,
        }
        true
    }
}

fn insert_indexed(map: &mut BTreeMap<usize, String>, index: Option<usize>, value: String) -> bool {
    match index {
        Some(index) => {
            map.entry(index).or_insert(value);
            true
        }
        None => false,
    }
}

/// Splits `f[0][value][1]` into `("f", ["0", "value", "1"])`.
fn split_key(key: &str) -> Option<(&str, Vec<&str>)> {
    let (name, mut rest) = match key.find('[') {
        Some(at) => key.split_at(at),
        None => return Some((key, Vec::new())),
    };
    let mut indices = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indices.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    Some((name, indices))
}

fn decode_component(raw: &str) -> Option<String> {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw).ok().map(std::borrow::Cow::into_owned)
}
