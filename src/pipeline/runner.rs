//! The per-repository pipeline.
//!
//! One call to [`RepoPipeline::run_repo`] drives a single repository
//! through provision → execute → archive → persist → cleanup and always
//! comes back with a [`RunOutcome`]. A failed analysis run is a valid,
//! informative outcome, not a pipeline fault: the only stage that short-
//! circuits is provisioning, because with no working tree there is nothing
//! to run or archive. Cleanup runs on every path, so no working tree
//! survives its run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::archive::archive_dir;
use crate::config::Config;
use crate::execution::AnalysisRunner;
use crate::pipeline::outcome::{load_outcome, persist_outcome, RepoRef, RunOutcome, RunStatus};
use crate::provision::{self, Provisioned};

/// Drives the full pipeline for single repositories.
///
/// Cheap to share across workers: everything it holds is read-only.
pub struct RepoPipeline {
    config: Arc<Config>,
    runner: Arc<dyn AnalysisRunner>,
    http: reqwest::Client,
}

impl RepoPipeline {
    pub fn new(config: Arc<Config>, runner: Arc<dyn AnalysisRunner>) -> Self {
        Self {
            config,
            runner,
            http: reqwest::Client::new(),
        }
    }

    /// Runs one repository through the whole state machine.
    ///
    /// Never fails: every terminal state is encoded in the returned
    /// outcome record, which has already been persisted by the time this
    /// returns.
    pub async fn run_repo(&self, repo: &RepoRef) -> RunOutcome {
        if self.config.resume {
            if let Some(outcome) = load_outcome(&self.config.dirs.json_results, repo) {
                info!(repo = %repo, "Resume: reusing existing outcome record");
                return outcome;
            }
        }

        info!(repo = %repo, "Pipeline started");

        // Provisioning. Contract violations (single-root-entry) are scoped
        // to this run: flagged loudly, recorded as download_failure, and
        // the batch continues.
        let provisioned = match provision::provision(
            &self.http,
            &self.config.source,
            &repo.repo_name,
            &repo.revision,
            &self.config.dirs.repo_data,
        )
        .await
        {
            Ok(provisioned) => provisioned,
            Err(err) => {
                error!(repo = %repo, error = %err, "Provisioning contract violated; recording download_failure");
                return self.finish(repo, RunStatus::DownloadFailure, Duration::ZERO, String::new());
            }
        };

        let project_dir = match provisioned {
            Provisioned::Ready { project_dir } => project_dir,
            Provisioned::FetchFailed => {
                return self.finish(repo, RunStatus::DownloadFailure, Duration::ZERO, String::new());
            }
        };

        // Executing.
        let dir_name = repo.dir_name();
        let results_dir = self.config.dirs.results.join(&dir_name);
        if let Err(err) = std::fs::create_dir_all(&results_dir) {
            error!(repo = %repo, error = %err, "Could not create results directory");
            return self.finish(repo, RunStatus::UnknownFailure, Duration::ZERO, String::new());
        }

        let run_name = format!("scan-forge-{dir_name}");
        let report = self.runner.run(&run_name, &project_dir, &results_dir).await;

        // Archiving — always, whatever the run status: partial output from
        // a timed-out or crashed scan is still data.
        let archive_name = repo.archive_name();
        let archive_path = self.config.dirs.archives.join(&archive_name);
        let archive_name = match archive_dir(&results_dir, &archive_path) {
            Ok(()) => archive_name,
            Err(err) => {
                error!(repo = %repo, error = %err, "Result archiving failed");
                String::new()
            }
        };

        self.finish(repo, report.status, report.duration, archive_name)
    }

    /// Persisting → Cleaning → Done. Builds the outcome record, writes it
    /// durably, then removes the run's scratch state unconditionally.
    fn finish(
        &self,
        repo: &RepoRef,
        status: RunStatus,
        duration: Duration,
        archive_name: String,
    ) -> RunOutcome {
        let outcome = RunOutcome::new(
            repo,
            status,
            &self.config.exit_codes,
            duration,
            archive_name,
        );

        if let Err(err) = persist_outcome(&self.config.dirs.json_results, &outcome) {
            error!(repo = %repo, error = %err, "Failed to persist outcome record");
        }

        provision::cleanup(&repo.repo_name, &repo.revision, &self.config.dirs.repo_data);

        info!(
            repo = %repo,
            status = %status,
            execution_secs = outcome.execution_time,
            archive = %outcome.result_archive_name,
            "Pipeline finished"
        );

        outcome
    }
}
