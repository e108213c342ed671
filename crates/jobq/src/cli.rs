//! Command-line interface for `jobq`.
//!
//! ```bash
//! # Print the first page, grouped by queue
//! jobq resolve --jobs jobs.json --query 'g[0]=queue'
//!
//! # How many jobs would cancelling the "gpu" queue touch?
//! jobq affected --jobs jobs.json --query 'g[0]=queue' --select group:queue:gpu
//!
//! # Cancel them
//! jobq cancel --jobs jobs.json --query 'g[0]=queue' --select group:queue:gpu --reason drain
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use jobtable::group::{ParseKeyError, SelectionKey};

/// Inspect and act on a hierarchical job table from the command line.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "jobq",
    author,
    version,
    about = "Inspect and act on a hierarchical job table",
    long_about = "Loads jobs from a JSON file into an in-memory backend, restores the \
                  table view from a URL query string and resolves rows or runs bulk actions."
)]
pub struct Cli {
    /// Table configuration file (JSON)
    #[arg(long, short = 'c', global = true, env = "JOBQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    ///
    /// Overridden by the `JOBQ_LOG` filter when set
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do with the table.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve and print the current page
    Resolve(TableArgs),

    /// Count the jobs a bulk action would touch
    Affected {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Action the count is for
        #[arg(long, value_enum, default_value_t = Action::Cancel)]
        action: Action,
    },

    /// Cancel the selected jobs
    Cancel {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Reason recorded with the cancellation
        #[arg(long, short = 'r')]
        reason: Option<String>,
    },

    /// Change the priority of the selected jobs
    Reprioritize {
        #[command(flatten)]
        selection: SelectionArgs,

        /// New priority (lower runs first)
        #[arg(long, short = 'p')]
        priority: u32,
    },
}

/// Where the jobs come from and which view to restore.
#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    /// JSON file holding an array of jobs
    #[arg(long, short = 'j')]
    pub jobs: PathBuf,

    /// URL query string describing the table view
    #[arg(long, short = 'q', default_value = "")]
    pub query: String,
}

/// Table arguments plus the rows to act on.
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// Row to select: `job:<id>` or `group:<path>` (repeatable)
    #[arg(long, short = 's', required = true, value_parser = parse_selection_key)]
    pub select: Vec<SelectionKey>,
}

/// Bulk action kinds.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Cancel,
    Reprioritize,
}

impl Action {
    /// Past participle used in confirmation messages.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Cancel => "cancelled",
            Self::Reprioritize => "reprioritized",
        }
    }
}

fn parse_selection_key(s: &str) -> Result<SelectionKey, ParseKeyError> {
    s.parse()
}

impl Cli {
    /// Default log filter for the verbosity count.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Parse from an iterator (for testing).
    #[cfg(test)]
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }
}
