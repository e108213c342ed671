//! Plain-text rendering of resolved rows and bulk-action reports.

use std::fmt::Write;

use jobtable::prelude::*;

const INDENT: &str = "  ";

/// Renders the page as an indented outline followed by the page summary.
pub fn outline(rows: &ResolvedRows, state: &TableState) -> String {
    let mut out = String::new();
    for row in &rows.rows {
        out.push_str(&INDENT.repeat(row.depth()));
        match row {
            RowNode::Group(group) => {
                let arrow = if group.expanded { "v" } else { ">" };
                let _ = write!(
                    out,
                    "{arrow} {}={} ({})",
                    group.column, group.value, group.count
                );
                for (job_state, n) in &group.state_counts {
                    let _ = write!(out, " {job_state}:{n}");
                }
                if let Some(err) = &group.error {
                    let _ = write!(out, " [error: {err}]");
                }
            }
            RowNode::Job(job) => {
                let job = &job.job;
                let _ = write!(
                    out,
                    "- {} {} queue={} jobSet={} priority={}",
                    job.job_id, job.state, job.queue, job.job_set, job.priority
                );
            }
        }
        if state.is_selected(&row.selection_key()) {
            out.push_str(" [selected]");
        }
        out.push('\n');
    }
    if rows.is_empty() {
        out.push_str("(no rows)\n");
    }
    let _ = writeln!(out, "{}", rows.summary());
    out
}

/// Renders per-job outcomes followed by a one-line tally.
pub fn report(report: &BulkReport, verb: &str) -> String {
    let mut out = String::new();
    for (id, outcome) in &report.outcomes {
        match outcome {
            MutationOutcome::Applied => {
                let _ = writeln!(out, "{verb} {id}");
            }
            MutationOutcome::Rejected(reason) => {
                let _ = writeln!(out, "failed {id}: {reason}");
            }
        }
    }
    let _ = writeln!(
        out,
        "{} {verb}, {} failed",
        report.succeeded().count(),
        report.failed().len()
    );
    out
}
