#![forbid(unsafe_code)]

//! `jobq`: resolve a job table view or run bulk actions against a job file.

mod cli;
mod render;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use jobtable::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cli::{Action, Cli, Command, SelectionArgs, TableArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut out = String::new();
    let result = run(cli, &mut out).await;
    print!("{out}");
    result
}

fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_env("JOBQ_LOG").unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs a command, appending its report to `out`.
///
/// Output is collected even when the command fails part-way so that a
/// partially applied bulk action still lists what happened.
async fn run(cli: Cli, out: &mut String) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Resolve(args) => {
            let table = open_table(&args, config).await?;
            let rows = match table.view() {
                TableView::Ready(rows) => rows,
                TableView::Failed(err) => bail!("could not resolve rows: {err}"),
                TableView::Loading => bail!("resolve did not complete"),
            };
            out.push_str(&render::outline(rows, table.state()));
            out.push_str(&format!("query: {}\n", table.query_string()));
        }
        Command::Affected { selection, action } => {
            let table = select(&selection, config).await?;
            let affected = table.affected_jobs(ResolveMode::Count).await?;
            out.push_str(&format!("{} job(s) will be {}\n", affected.len(), action.verb()));
        }
        Command::Cancel { selection, reason } => {
            let table = select(&selection, config).await?;
            let report = table.cancel_selected(reason).await?;
            finish(report, Action::Cancel, out)?;
        }
        Command::Reprioritize {
            selection,
            priority,
        } => {
            let table = select(&selection, config).await?;
            let report = table.reprioritize_selected(priority).await?;
            finish(report, Action::Reprioritize, out)?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TableConfig> {
    let Some(path) = path else {
        return Ok(TableConfig::default());
    };
    let config = TableConfig::from_json_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    debug!(path = %path.display(), "loaded table config");
    Ok(config)
}

fn load_jobs(path: &Path) -> anyhow::Result<Vec<Job>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let jobs: Vec<Job> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of jobs", path.display()))?;
    info!(count = jobs.len(), path = %path.display(), "loaded jobs");
    Ok(jobs)
}

/// Builds a table over the job file with the view restored from the query,
/// and waits for its first resolve.
async fn open_table(
    args: &TableArgs,
    config: TableConfig,
) -> anyhow::Result<JobTable<InMemoryJobService>> {
    let service = Arc::new(InMemoryJobService::new(load_jobs(&args.jobs)?));
    let mut table = JobTable::from_query(service, config, &args.query);
    debug!(query = %table.query_string(), "restored table state");
    let cmd = table.init();
    table.settle(cmd).await;
    Ok(table)
}

async fn select(
    args: &SelectionArgs,
    config: TableConfig,
) -> anyhow::Result<JobTable<InMemoryJobService>> {
    let mut table = open_table(&args.table, config).await?;
    for key in &args.select {
        if !table.state().is_selected(key) {
            table.dispatch(TableMsg::ToggleSelect(key.clone())).await?;
        }
    }
    Ok(table)
}

fn finish(report: BulkReport, action: Action, out: &mut String) -> anyhow::Result<()> {
    out.push_str(&render::report(&report, action.verb()));
    report.into_result()?;
    Ok(())
}
