//! End-to-end tests for the jobq binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const JOBS: &str = r#"[
  {"jobId": "a1", "queue": "alpha", "jobSet": "s", "state": "QUEUED",
   "submitted": "2024-01-01T00:00:00Z", "lastTransitionTime": "2024-01-01T00:00:00Z"},
  {"jobId": "a2", "queue": "alpha", "jobSet": "s", "state": "RUNNING",
   "submitted": "2024-01-01T00:01:00Z", "lastTransitionTime": "2024-01-01T00:01:00Z"},
  {"jobId": "a3", "queue": "alpha", "jobSet": "s", "state": "SUCCEEDED",
   "submitted": "2024-01-01T00:02:00Z", "lastTransitionTime": "2024-01-01T00:02:00Z"},
  {"jobId": "b1", "queue": "beta", "jobSet": "t", "state": "QUEUED", "priority": 4,
   "submitted": "2024-01-01T00:03:00Z", "lastTransitionTime": "2024-01-01T00:03:00Z"},
  {"jobId": "b2", "queue": "beta", "jobSet": "t", "state": "PENDING",
   "submitted": "2024-01-01T00:04:00Z", "lastTransitionTime": "2024-01-01T00:04:00Z"}
]"#;

#[allow(deprecated)]
fn jobq() -> Command {
    let mut cmd = Command::cargo_bin("jobq").unwrap();
    cmd.env_remove("JOBQ_LOG").env_remove("JOBQ_CONFIG");
    cmd
}

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

mod resolve {
    use super::*;

    #[test]
    fn flat_page_lists_every_job() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["resolve", "--jobs"])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("- b2 PENDING queue=beta jobSet=t"))
            .stdout(predicate::str::contains("- b1 QUEUED queue=beta jobSet=t priority=4"))
            .stdout(predicate::str::contains("1–5 of 5"))
            .stdout(predicate::str::contains("query: \n"));
    }

    #[test]
    fn grouped_page_shows_counts() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["resolve", "--query", "g[0]=queue", "--jobs"])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("> queue=alpha (3)"))
            .stdout(predicate::str::contains("> queue=beta (2)"))
            .stdout(predicate::str::contains("1–2 of 2"))
            .stdout(predicate::str::contains("query: g[0]=queue"));
    }

    #[test]
    fn expanded_group_nests_its_jobs() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["resolve", "--query", "g[0]=queue&e[0]=queue%3Aalpha", "--jobs"])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("v queue=alpha (3)"))
            .stdout(predicate::str::contains("  - a1 QUEUED queue=alpha"))
            .stdout(predicate::str::contains("> queue=beta (2)"));
    }

    #[test]
    fn malformed_query_parts_are_ignored() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["resolve", "--query", "page=abc&g[0]=nope", "--jobs"])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("1–5 of 5"))
            .stdout(predicate::str::contains("query: \n"));
    }

    #[test]
    fn config_sets_page_size() {
        let jobs = write_file(JOBS);
        let config = write_file(r#"{ "defaultPageSize": 2 }"#);
        jobq()
            .arg("resolve")
            .arg("--jobs")
            .arg(jobs.path())
            .arg("--config")
            .arg(config.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("1–2 of more than 2"));
    }

    #[test]
    fn missing_jobs_file_fails() {
        jobq()
            .args(["resolve", "--jobs", "/definitely/not/here.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to read"));
    }

    #[test]
    fn invalid_jobs_file_fails() {
        let jobs = write_file(r#"{"not": "an array"}"#);
        jobq()
            .args(["resolve", "--jobs"])
            .arg(jobs.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("is not a JSON array of jobs"));
    }
}

mod bulk_actions {
    use super::*;

    #[test]
    fn affected_counts_only_non_terminal_jobs() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["affected", "-q", "g[0]=queue", "-s", "group:queue:alpha", "--jobs"])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout("2 job(s) will be cancelled\n");
    }

    #[test]
    fn affected_dedups_jobs_inside_selected_groups() {
        let jobs = write_file(JOBS);
        jobq()
            .args([
                "affected",
                "-q",
                "g[0]=queue",
                "-s",
                "group:queue:beta",
                "-s",
                "job:b1",
                "--action",
                "reprioritize",
                "--jobs",
            ])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout("2 job(s) will be reprioritized\n");
    }

    #[test]
    fn cancel_reports_each_job() {
        let jobs = write_file(JOBS);
        jobq()
            .args([
                "cancel",
                "-q",
                "g[0]=queue",
                "-s",
                "group:queue:alpha",
                "-s",
                "job:b1",
                "--reason",
                "drain",
                "--jobs",
            ])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("cancelled a1\n"))
            .stdout(predicate::str::contains("cancelled a2\n"))
            .stdout(predicate::str::contains("cancelled b1\n"))
            .stdout(predicate::str::contains("3 cancelled, 0 failed"))
            .stdout(predicate::str::contains("a3").not());
    }

    #[test]
    fn cancelling_a_finished_job_fails() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["cancel", "-s", "job:a3", "-s", "job:a1", "--jobs"])
            .arg(jobs.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("cancelled a1"))
            .stdout(predicate::str::contains("failed a3: job is already SUCCEEDED"))
            .stdout(predicate::str::contains("1 cancelled, 1 failed"))
            .stderr(predicate::str::contains("1 job(s) could not be updated"));
    }

    #[test]
    fn reprioritize_applies_to_selected_jobs() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["reprioritize", "-s", "job:a1", "-p", "3", "--jobs"])
            .arg(jobs.path())
            .assert()
            .success()
            .stdout("reprioritized a1\n1 reprioritized, 0 failed\n");
    }

    #[test]
    fn bad_selection_key_is_a_usage_error() {
        let jobs = write_file(JOBS);
        jobq()
            .args(["cancel", "-s", "a1", "--jobs"])
            .arg(jobs.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected job: or group: prefix"));
    }
}
