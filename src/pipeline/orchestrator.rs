//! Batch fan-out over all input repositories.
//!
//! A fixed-size pool of workers (semaphore-bounded tokio tasks) runs one
//! per-repository pipeline each; workers share nothing mutable. Per-run
//! failures are data in the outcome records — the batch itself only fails
//! if orchestration cannot proceed at all (unreadable input, unwritable
//! aggregate).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::execution::AnalysisRunner;
use crate::pipeline::outcome::{
    dedup_repos, persist_outcome, read_batch_input, write_aggregate, RunOutcome, RunStatus,
};
use crate::pipeline::runner::RepoPipeline;
use crate::provision;
use crate::publish::HfPublisher;

/// Counts of terminal states across one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub clean: usize,
    pub with_findings: usize,
    pub download_failures: usize,
    pub timeouts: usize,
    pub create_container_failures: usize,
    pub unknown_failures: usize,
}

impl BatchSummary {
    fn from_outcomes(outcomes: &[RunOutcome], config: &Config) -> Self {
        let codes = &config.exit_codes;
        let mut summary = Self {
            total: outcomes.len(),
            clean: 0,
            with_findings: 0,
            download_failures: 0,
            timeouts: 0,
            create_container_failures: 0,
            unknown_failures: 0,
        };

        for outcome in outcomes {
            let code = outcome.exit_code;
            if code == codes.download_failure {
                summary.download_failures += 1;
            } else if code == codes.timeout {
                summary.timeouts += 1;
            } else if code == codes.create_container_failure {
                summary.create_container_failures += 1;
            } else if code == codes.unknown_failure {
                summary.unknown_failures += 1;
            } else if code == 0 {
                summary.clean += 1;
            } else {
                summary.with_findings += 1;
            }
        }

        summary
    }
}

/// Drives a whole batch: input parsing, fan-out, aggregation, publishing.
pub struct BatchOrchestrator {
    config: Arc<Config>,
    pipeline: Arc<RepoPipeline>,
    publisher: Option<Arc<HfPublisher>>,
}

impl BatchOrchestrator {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn AnalysisRunner>,
        publisher: Option<Arc<HfPublisher>>,
    ) -> Self {
        let pipeline = Arc::new(RepoPipeline::new(Arc::clone(&config), runner));
        Self {
            config,
            pipeline,
            publisher,
        }
    }

    /// Runs the batch to completion and returns the outcome counts.
    ///
    /// Individual repository failures never surface here; only faults of
    /// the orchestration itself (unreadable input, unwritable aggregate)
    /// are errors.
    pub async fn run(&self) -> anyhow::Result<BatchSummary> {
        let repos = read_batch_input(&self.config.input_file).map_err(|err| {
            anyhow::anyhow!(
                "failed to read input '{}': {err}",
                self.config.input_file.display()
            )
        })?;
        let repos = dedup_repos(repos);

        self.config.ensure_dirs()?;
        info!(
            total = repos.len(),
            workers = self.config.workers,
            image = %self.config.docker.image,
            "Batch started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut handles = Vec::with_capacity(repos.len());
        for repo in repos.iter().cloned() {
            let pipeline = Arc::clone(&self.pipeline);
            let publisher = self.publisher.clone();
            let config = Arc::clone(&self.config);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                let outcome = pipeline.run_repo(&repo).await;

                if let Some(publisher) = publisher {
                    if config.publish.push_dynamically && !outcome.result_archive_name.is_empty() {
                        push_archive(
                            &publisher,
                            &config,
                            &outcome.result_archive_name,
                        )
                        .await;
                    }
                }

                outcome
            }));
        }

        let results = futures::future::join_all(handles).await;

        let mut outcomes = Vec::with_capacity(repos.len());
        for (repo, result) in repos.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    // A panicked worker must not cost the batch its record
                    // or leave scratch state behind.
                    error!(repo = %repo, error = %err, "Worker task aborted; recording unknown_failure");
                    let outcome = RunOutcome::new(
                        repo,
                        RunStatus::UnknownFailure,
                        &self.config.exit_codes,
                        Duration::ZERO,
                        String::new(),
                    );
                    if let Err(persist_err) =
                        persist_outcome(&self.config.dirs.json_results, &outcome)
                    {
                        error!(repo = %repo, error = %persist_err, "Failed to persist outcome record");
                    }
                    provision::cleanup(
                        &repo.repo_name,
                        &repo.revision,
                        &self.config.dirs.repo_data,
                    );
                    outcomes.push(outcome);
                }
            }
        }

        write_aggregate(&self.config.output_file, &outcomes).map_err(|err| {
            anyhow::anyhow!(
                "failed to write aggregate '{}': {err}",
                self.config.output_file.display()
            )
        })?;
        info!(path = %self.config.output_file.display(), records = outcomes.len(), "Aggregate written");

        if let Some(publisher) = &self.publisher {
            self.publish_batch(publisher, &outcomes).await;
        }

        let summary = BatchSummary::from_outcomes(&outcomes, &self.config);
        info!(
            total = summary.total,
            clean = summary.clean,
            with_findings = summary.with_findings,
            download_failures = summary.download_failures,
            timeouts = summary.timeouts,
            create_container_failures = summary.create_container_failures,
            unknown_failures = summary.unknown_failures,
            "Batch finished"
        );

        Ok(summary)
    }

    /// End-of-batch publishing: the bulk archive commit (when per-run
    /// pushes are off) and the aggregate file. Faults are logged, never
    /// fatal — local records already hold everything.
    async fn publish_batch(&self, publisher: &HfPublisher, outcomes: &[RunOutcome]) {
        if !self.config.publish.push_dynamically {
            let mut files = Vec::new();
            for outcome in outcomes {
                if outcome.result_archive_name.is_empty() {
                    continue;
                }
                let path = self.config.dirs.archives.join(&outcome.result_archive_name);
                match std::fs::read(&path) {
                    Ok(bytes) => files.push((
                        format!("archives/{}", outcome.result_archive_name),
                        bytes,
                    )),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Skipping unreadable archive");
                    }
                }
            }

            match publisher.upload_files(&files, "Add result archives").await {
                Ok(()) => {
                    if !self.config.publish.keep_local {
                        for (name, _) in &files {
                            let local = self
                                .config
                                .dirs
                                .archives
                                .join(name.trim_start_matches("archives/"));
                            let _ = std::fs::remove_file(local);
                        }
                    }
                }
                Err(err) => warn!(error = %err, "Bulk archive upload failed"),
            }
        }

        if let Err(err) = publisher
            .upload_local_file(
                &self.config.output_file,
                "results.jsonl",
                "Add aggregate outcomes",
            )
            .await
        {
            warn!(error = %err, "Aggregate upload failed");
        }
    }
}

/// Per-run incremental upload of one result archive.
async fn push_archive(publisher: &HfPublisher, config: &Config, archive_name: &str) {
    let local = config.dirs.archives.join(archive_name);
    let path_in_repo = format!("archives/{archive_name}");
    let message = format!("Add {archive_name}");

    match publisher
        .upload_local_file(&local, &path_in_repo, &message)
        .await
    {
        Ok(()) => {
            if !config.publish.keep_local {
                let _ = std::fs::remove_file(&local);
            }
        }
        Err(err) => warn!(archive = %archive_name, error = %err, "Archive upload failed"),
    }
}
