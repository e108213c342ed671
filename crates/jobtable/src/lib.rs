#![forbid(unsafe_code)]
// Allow pedantic lints for early-stage API ergonomics.
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::nursery)]
#![allow(clippy::pedantic)]

//! # Jobtable
//!
//! A state engine for hierarchical job tables: a flat or multi-level grouped
//! view over remote job records that is paginated, filterable, sortable and
//! selectable, with its whole view state round-trippable through a URL
//! query string.
//!
//! The crate is organised leaves first:
//! - **query_params** - Query-string codec for the table state
//! - **state** - The table state and its pure reducers
//! - **resolver** - Turns a state into the rows of the current page
//! - **selection** - Resolves selections and issues bulk actions
//! - **table** - Orchestrator tying the above together
//!
//! Supporting modules hold the domain types (**job**, **column**,
//! **filter**, **group**, **total**), the backend contracts (**service**),
//! an in-memory backend (**memory**), configuration and errors.
//!
//! ## Example
//!
//! ```rust
//! use jobtable::prelude::*;
//!
//! let catalog = ColumnCatalog::standard();
//! let codec = QueryParamCodec::new(catalog.clone(), TableConfig::default());
//!
//! let state = TableState::default()
//!     .set_grouping(&catalog, vec![ColumnId::Queue])
//!     .unwrap()
//!     .set_page(2);
//! assert_eq!(codec.decode(&codec.encode(&state)), state);
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod filter;
pub mod group;
pub mod job;
pub mod memory;
pub mod query_params;
pub mod resolver;
pub mod selection;
pub mod service;
pub mod state;
pub mod table;
pub mod total;

pub use error::{Error, FetchError, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::column::{ColumnCatalog, ColumnId, ColumnSpec, FilterKind};
    pub use crate::config::{ConfigError, TableConfig};
    pub use crate::error::{Error, FetchError, FetchScope};
    pub use crate::filter::{Filter, FilterValue, MatchKind};
    pub use crate::group::{GroupPath, SelectionKey};
    pub use crate::job::{Job, JobId, JobState};
    pub use crate::memory::InMemoryJobService;
    pub use crate::query_params::QueryParamCodec;
    pub use crate::resolver::{GroupRow, JobRow, ResolvedRows, RowNode, RowResolver};
    pub use crate::selection::{AffectedJobs, BulkReport, ResolveMode, SelectionCoordinator};
    pub use crate::service::{
        GroupFetcher, JobFetcher, JobMutator, JobService, Mutation, MutationOutcome,
    };
    pub use crate::state::{Sort, SortDirection, TableState};
    pub use crate::table::{JobTable, ResolveCmd, ResolveMsg, TableMsg, TableView};
    pub use crate::total::{PageSummary, Total};
}
