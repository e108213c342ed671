//! Row counts that may only be known as a lower bound.
//!
//! Backends can cap the cost of counting and report "at least N" instead of
//! an exact number. [`Total`] keeps that distinction all the way to the page
//! summary text.
//!
//! # Example
//!
//! ```rust
//! use jobtable::total::{PageSummary, Total};
//!
//! let summary = PageSummary::new(0, 50, 50, Total::AtLeast(51));
//! assert_eq!(summary.to_string(), "1–50 of more than 50");
//!
//! let summary = PageSummary::new(1, 50, 10, Total::Exact(60));
//! assert_eq!(summary.to_string(), "51–60 of 60");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A count that is either exact or a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Total {
    /// The exact count.
    Exact(u64),
    /// At least this many; the real count may be higher.
    AtLeast(u64),
}

impl Total {
    /// Builds a total from a count and an exactness flag.
    #[must_use]
    pub const fn new(count: u64, exact: bool) -> Self {
        if exact {
            Self::Exact(count)
        } else {
            Self::AtLeast(count)
        }
    }

    /// The known count (exact, or the lower bound).
    #[must_use]
    pub const fn count(self) -> u64 {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => n,
        }
    }

    /// Returns true for an exact count.
    #[must_use]
    pub const fn is_exact(self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Adds two totals; the sum is exact only if both parts are.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self::new(
            self.count().saturating_add(other.count()),
            self.is_exact() && other.is_exact(),
        )
    }
}

impl Default for Total {
    fn default() -> Self {
        Self::Exact(0)
    }
}

impl fmt::Display for Total {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::AtLeast(n) => write!(f, "more than {}", n.saturating_sub(1)),
        }
    }
}

/// The "first–last of total" line shown under a paginated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    /// 1-based index of the first row on the page (0 when empty).
    pub first: u64,
    /// 1-based index of the last row on the page (0 when empty).
    pub last: u64,
    /// Total across all pages.
    pub total: Total,
}

impl PageSummary {
    /// Computes the summary for `rows_on_page` top-level rows on page
    /// `page` of size `page_size`.
    #[must_use]
    pub fn new(page: usize, page_size: usize, rows_on_page: usize, total: Total) -> Self {
        if rows_on_page == 0 {
            return Self {
                first: 0,
                last: 0,
                total,
            };
        }
        let start = (page as u64).saturating_mul(page_size as u64);
        Self {
            first: start + 1,
            last: start + rows_on_page as u64,
            total,
        }
    }
}

impl fmt::Display for PageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{} of {}", self.first, self.last, self.total)
    }
}
