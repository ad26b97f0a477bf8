//! The analysis run executor.
//!
//! [`AnalysisRunner`] is the seam between the per-repository pipeline and
//! the container runtime; [`DockerRunner`] is the production
//! implementation. Its outcome mapping is total: every reachable failure of
//! the launch/wait sequence becomes exactly one [`RunStatus`], decided by
//! which call raised, and the wall-clock duration is recorded on every
//! path including immediate creation failure.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::DockerConfig;
use crate::execution::docker_client::{ContainerSpec, DockerClient};
use crate::pipeline::RunStatus;

/// Fixed in-container mount point for the working tree.
pub const PROJECT_MOUNT: &str = "/data/project";
/// Fixed in-container mount point for the results directory.
pub const RESULTS_MOUNT: &str = "/data/results";

/// What one analysis run produced: a terminal status and how long the
/// launch+wait sequence took.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub status: RunStatus,
    pub duration: Duration,
}

/// Executes one isolated analysis run against a prepared working tree.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    /// Runs the scanner over `project_dir`, writing into `results_dir`.
    ///
    /// Infallible by design: failures are data, carried in the report's
    /// status.
    async fn run(&self, run_name: &str, project_dir: &Path, results_dir: &Path) -> RunReport;
}

/// Production runner backed by the local Docker daemon.
pub struct DockerRunner {
    image: String,
    timeout: Duration,
    token_env: String,
    token: Option<String>,
}

impl DockerRunner {
    /// Builds a runner from the docker section of the batch config.
    ///
    /// The scanner token is read from the configured environment variable
    /// once, here; it is forwarded into each container's environment and
    /// nowhere else.
    pub fn new(config: &DockerConfig) -> Self {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            warn!(
                var = %config.token_env,
                "Scanner token not set; containers run without it"
            );
        }

        Self {
            image: config.image.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            token_env: config.token_env.clone(),
            token,
        }
    }

    async fn launch_and_wait(
        &self,
        run_name: &str,
        project_dir: &Path,
        results_dir: &Path,
    ) -> RunStatus {
        // Bind sources must be absolute for the daemon.
        let project_dir = match project_dir.canonicalize() {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %project_dir.display(), error = %err, "Working tree path not resolvable");
                return RunStatus::UnknownFailure;
            }
        };
        let results_dir = match results_dir.canonicalize() {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %results_dir.display(), error = %err, "Results path not resolvable");
                return RunStatus::UnknownFailure;
            }
        };

        let client = match DockerClient::connect() {
            Ok(client) => client,
            Err(err) => return classify_launch_error(LaunchStage::Create, &err),
        };

        let mut spec = ContainerSpec::new(run_name, &self.image)
            .with_bind(&project_dir.to_string_lossy(), PROJECT_MOUNT)
            .with_bind(&results_dir.to_string_lossy(), RESULTS_MOUNT);
        if let Some(token) = &self.token {
            spec = spec.with_env(&self.token_env, token);
        }

        // A crashed batch can leave a container under the same name.
        if client.force_remove(run_name).await.is_ok() {
            debug!(container = %run_name, "Removed stale container");
        }

        let id = match client.create_container(&spec).await {
            Ok(id) => id,
            Err(err) => return classify_launch_error(LaunchStage::Create, &err),
        };

        let start_and_wait = async {
            client.start_container(&id).await?;
            client.wait_container(&id).await
        };

        match tokio::time::timeout(self.timeout, start_and_wait).await {
            Ok(Ok(status_code)) => RunStatus::Exited(status_code),
            Ok(Err(err)) => classify_launch_error(LaunchStage::Wait, &err),
            Err(_) => {
                // Did not finish within the window; tear the container down.
                let _ = client.force_remove(&id).await;
                RunStatus::Timeout
            }
        }
    }
}

#[async_trait]
impl AnalysisRunner for DockerRunner {
    async fn run(&self, run_name: &str, project_dir: &Path, results_dir: &Path) -> RunReport {
        let started = Instant::now();
        let status = self.launch_and_wait(run_name, project_dir, results_dir).await;
        let duration = started.elapsed();

        debug!(
            container = %run_name,
            status = %status,
            duration_secs = duration.as_secs_f64(),
            "Analysis run finished"
        );

        RunReport { status, duration }
    }
}

/// Which launch call raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchStage {
    Create,
    Wait,
}

/// Folds a bollard fault into the outcome taxonomy, once, at the boundary
/// where the failing call is known.
fn classify_launch_error(stage: LaunchStage, err: &bollard::errors::Error) -> RunStatus {
    use bollard::errors::Error;

    let status = match (stage, err) {
        // The daemon answered with an API error (bad image reference,
        // server-side fault): not a creation-transport failure.
        (_, Error::DockerResponseServerError { .. }) => RunStatus::UnknownFailure,
        // Nothing answered the creation call: the launch never started.
        (LaunchStage::Create, _) => RunStatus::CreateContainerFailure,
        (LaunchStage::Wait, _) => RunStatus::UnknownFailure,
    };

    warn!(stage = ?stage, error = %err, outcome = %status, "Container launch fault");
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> bollard::errors::Error {
        bollard::errors::Error::IOError {
            err: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
        }
    }

    fn api_error(status_code: u16, message: &str) -> bollard::errors::Error {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_connection_fault_at_create_is_create_failure() {
        assert_eq!(
            classify_launch_error(LaunchStage::Create, &io_error()),
            RunStatus::CreateContainerFailure
        );
    }

    #[test]
    fn test_bad_image_is_unknown_failure() {
        assert_eq!(
            classify_launch_error(LaunchStage::Create, &api_error(404, "no such image")),
            RunStatus::UnknownFailure
        );
    }

    #[test]
    fn test_wait_faults_are_unknown_failure() {
        assert_eq!(
            classify_launch_error(LaunchStage::Wait, &io_error()),
            RunStatus::UnknownFailure
        );
        assert_eq!(
            classify_launch_error(LaunchStage::Wait, &api_error(500, "daemon error")),
            RunStatus::UnknownFailure
        );
    }
}
