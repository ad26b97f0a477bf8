//! Docker execution layer for scanner runs.
//!
//! Built on the bollard crate. One scanner run is one container: the
//! prepared working tree and a dedicated results directory are bind-mounted
//! at fixed in-container paths, the container is launched detached so the
//! host enforces its own wall-clock timeout, and every way the launch can
//! fail is folded into the closed outcome taxonomy — nothing escapes as an
//! error.

pub mod docker_client;
pub mod runner;

pub use docker_client::{ContainerSpec, DockerClient};
pub use runner::{AnalysisRunner, DockerRunner, RunReport, PROJECT_MOUNT, RESULTS_MOUNT};
