//! Data model for batch inputs and per-run outcomes, plus record I/O.
//!
//! A [`RunOutcome`] is created exactly once per pipeline run, never
//! mutated, and written to its own durable record immediately — a crash
//! mid-batch loses at most the runs still in flight, never completed work.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ExitCodes;
use crate::paths;

/// One unit of work: a repository pinned at a revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub repo_name: String,
    pub revision: String,
}

impl RepoRef {
    /// Canonical scratch-directory name for this pair.
    pub fn dir_name(&self) -> String {
        paths::repo_dir_name(&self.repo_name, &self.revision)
    }

    /// Canonical archive name for this pair.
    pub fn archive_name(&self) -> String {
        paths::repo_archive_name(&self.repo_name, &self.revision)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repo_name, self.revision)
    }
}

/// Closed taxonomy of terminal states for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The container ran to completion with this exit status. Zero means a
    /// clean scan; nonzero is whatever the tool reports.
    Exited(i64),
    /// The repository snapshot could not be fetched (or was unusable).
    DownloadFailure,
    /// The container did not finish within the configured wall-clock bound.
    Timeout,
    /// The launch call itself failed to even start.
    CreateContainerFailure,
    /// Any other container/runtime-layer fault.
    UnknownFailure,
}

impl RunStatus {
    /// Serializable exit code for this status, using the configured
    /// sentinel values for the non-exit kinds.
    pub fn exit_code(&self, codes: &ExitCodes) -> i64 {
        match self {
            RunStatus::Exited(code) => *code,
            RunStatus::DownloadFailure => codes.download_failure,
            RunStatus::Timeout => codes.timeout,
            RunStatus::CreateContainerFailure => codes.create_container_failure,
            RunStatus::UnknownFailure => codes.unknown_failure,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Exited(code) => write!(f, "exit status {code}"),
            RunStatus::DownloadFailure => write!(f, "download_failure"),
            RunStatus::Timeout => write!(f, "timeout"),
            RunStatus::CreateContainerFailure => write!(f, "create_container_failure"),
            RunStatus::UnknownFailure => write!(f, "unknown_failure"),
        }
    }
}

/// Immutable record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub exit_code: i64,
    /// Wall-clock seconds of the launch+wait sequence; 0.0 when nothing ran.
    pub execution_time: f64,
    /// Result archive file name, empty when no archive was produced.
    pub result_archive_name: String,
    pub repo_name: String,
    pub commit_sha: String,
}

impl RunOutcome {
    /// Builds the record for one finished run.
    pub fn new(
        repo: &RepoRef,
        status: RunStatus,
        codes: &ExitCodes,
        duration: Duration,
        result_archive_name: String,
    ) -> Self {
        Self {
            exit_code: status.exit_code(codes),
            execution_time: duration.as_secs_f64(),
            result_archive_name,
            repo_name: repo.repo_name.clone(),
            commit_sha: repo.revision.clone(),
        }
    }
}

/// Reads the batch input: one JSON record per line with at least
/// `repo_name` and `revision`. Malformed lines are skipped with a warning.
pub fn read_batch_input(path: &Path) -> std::io::Result<Vec<RepoRef>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut repos = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RepoRef>(&line) {
            Ok(repo) => repos.push(repo),
            Err(err) => {
                warn!(line = lineno + 1, error = %err, "Skipping malformed input record");
            }
        }
    }

    Ok(repos)
}

/// Drops repeated (repository, revision) pairs, keeping first occurrences.
///
/// Duplicates would race on the same scratch paths, so they are removed
/// before fan-out.
pub fn dedup_repos(repos: Vec<RepoRef>) -> Vec<RepoRef> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(repos.len());
    for repo in repos {
        if seen.insert(repo.clone()) {
            unique.push(repo);
        } else {
            warn!(repo = %repo, "Dropping duplicate input entry");
        }
    }
    unique
}

/// Writes a run's durable record to `<json_results_dir>/<dir_name>.json`.
pub fn persist_outcome(json_results_dir: &Path, outcome: &RunOutcome) -> std::io::Result<PathBuf> {
    let path = json_results_dir.join(paths::outcome_record_name(
        &outcome.repo_name,
        &outcome.commit_sha,
    ));
    let json = serde_json::to_string_pretty(outcome)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Loads a previously persisted record for a pair, if one exists and
/// parses. Used by resume.
pub fn load_outcome(json_results_dir: &Path, repo: &RepoRef) -> Option<RunOutcome> {
    let path = json_results_dir.join(paths::outcome_record_name(&repo.repo_name, &repo.revision));
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            warn!(repo = %repo, error = %err, "Ignoring corrupt outcome record");
            None
        }
    }
}

/// Writes the aggregate batch file: one JSON record per line.
pub fn write_aggregate(path: &Path, outcomes: &[RunOutcome]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for outcome in outcomes {
        let line = serde_json::to_string(outcome)?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Collects every per-run record in a directory, for rebuilding the
/// aggregate after a partial batch.
pub fn collect_outcomes(json_results_dir: &Path) -> std::io::Result<Vec<RunOutcome>> {
    let mut outcomes = Vec::new();
    for entry in std::fs::read_dir(json_results_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping unparseable outcome record");
            }
        }
    }
    outcomes.sort_by(|a: &RunOutcome, b: &RunOutcome| {
        (&a.repo_name, &a.commit_sha).cmp(&(&b.repo_name, &b.commit_sha))
    });
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef {
            repo_name: "octocat/Hello-World".to_string(),
            revision: "abc123".to_string(),
        }
    }

    #[test]
    fn test_exit_code_mapping_is_total() {
        let codes = ExitCodes::default();

        assert_eq!(RunStatus::Exited(0).exit_code(&codes), 0);
        assert_eq!(RunStatus::Exited(137).exit_code(&codes), 137);
        assert_eq!(RunStatus::DownloadFailure.exit_code(&codes), -1);
        assert_eq!(RunStatus::Timeout.exit_code(&codes), -2);
        assert_eq!(RunStatus::CreateContainerFailure.exit_code(&codes), -3);
        assert_eq!(RunStatus::UnknownFailure.exit_code(&codes), -4);
    }

    #[test]
    fn test_outcome_record_field_names() {
        let outcome = RunOutcome::new(
            &repo(),
            RunStatus::Exited(137),
            &ExitCodes::default(),
            Duration::from_secs_f64(42.3),
            "octocat_Hello-World_abc123.zip".to_string(),
        );

        let json = serde_json::to_string(&outcome).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["exit_code"], 137);
        assert!((value["execution_time"].as_f64().unwrap() - 42.3).abs() < 1e-9);
        assert_eq!(value["result_archive_name"], "octocat_Hello-World_abc123.zip");
        assert_eq!(value["repo_name"], "octocat/Hello-World");
        assert_eq!(value["commit_sha"], "abc123");
    }

    #[test]
    fn test_read_batch_input_skips_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repos.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"repo_name": "octocat/Hello-World", "revision": "abc123"}"#,
                "\n",
                "not json at all\n",
                "\n",
                r#"{"repo_name": "torvalds/linux", "revision": "def456", "stars": 170000}"#,
                "\n",
            ),
        )
        .unwrap();

        let repos = read_batch_input(&path).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].repo_name, "octocat/Hello-World");
        assert_eq!(repos[1].revision, "def456");
    }

    #[test]
    fn test_dedup_drops_repeats_keeps_order() {
        let a = repo();
        let b = RepoRef {
            repo_name: "torvalds/linux".to_string(),
            revision: "def456".to_string(),
        };
        let repos = dedup_repos(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(repos, vec![a, b]);
    }

    #[test]
    fn test_persist_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = RunOutcome::new(
            &repo(),
            RunStatus::Timeout,
            &ExitCodes::default(),
            Duration::from_secs(300),
            String::new(),
        );

        let path = persist_outcome(tmp.path(), &outcome).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "octocat_Hello-World_abc123.json"
        );

        let loaded = load_outcome(tmp.path(), &repo()).unwrap();
        assert_eq!(loaded, outcome);
    }

    #[test]
    fn test_load_outcome_absent_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_outcome(tmp.path(), &repo()).is_none());
    }

    #[test]
    fn test_aggregate_and_collect() {
        let tmp = tempfile::tempdir().unwrap();
        let codes = ExitCodes::default();
        let first = RunOutcome::new(&repo(), RunStatus::Exited(0), &codes, Duration::ZERO, String::new());
        let second = RunOutcome::new(
            &RepoRef {
                repo_name: "torvalds/linux".to_string(),
                revision: "def456".to_string(),
            },
            RunStatus::DownloadFailure,
            &codes,
            Duration::ZERO,
            String::new(),
        );

        persist_outcome(tmp.path(), &first).unwrap();
        persist_outcome(tmp.path(), &second).unwrap();

        let collected = collect_outcomes(tmp.path()).unwrap();
        assert_eq!(collected.len(), 2);

        let aggregate = tmp.path().join("all.jsonl");
        write_aggregate(&aggregate, &collected).unwrap();
        let raw = std::fs::read_to_string(&aggregate).unwrap();
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<RunOutcome>(line).unwrap();
        }
    }
}
