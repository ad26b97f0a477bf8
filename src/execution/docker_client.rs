//! Docker API wrapper using the bollard crate.
//!
//! Deliberately thin: methods return raw `bollard::errors::Error` so the
//! runner can classify faults once, at the call that raised them.

use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

/// Configuration for one scanner container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Unique name for the container.
    pub name: String,
    /// Scanner image reference.
    pub image: String,
    /// Environment variables in `NAME=value` form.
    pub env: Vec<String>,
    /// Volume mounts in `host:container:mode` form.
    pub binds: Vec<String>,
}

impl ContainerSpec {
    /// Creates a new container spec with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            binds: Vec::new(),
        }
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    /// Adds a volume mount.
    pub fn with_bind(mut self, host: &str, container: &str) -> Self {
        self.binds.push(format!("{host}:{container}:rw"));
        self
    }
}

/// Docker client wrapper for container lifecycle operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connects to the local Docker daemon. Connections are per run, not
    /// pooled.
    pub fn connect() -> Result<Self, Error> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Creates a container from the spec and returns its ID.
    ///
    /// The container is configured to remove itself when it stops, so
    /// finished runs never accumulate as dangling containers.
    pub async fn create_container(&self, spec: &ContainerSpec) -> Result<String, Error> {
        let host_config = HostConfig {
            binds: if spec.binds.is_empty() {
                None
            } else {
                Some(spec.binds.clone())
            },
            auto_remove: Some(true),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), Error> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    /// Blocks until the container stops and returns its exit status.
    pub async fn wait_container(&self, id: &str) -> Result<i64, Error> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(result) => Ok(result?.status_code),
            None => Err(Error::DockerStreamError {
                error: "wait stream ended without a status".to_string(),
            }),
        }
    }

    /// Force-removes a container by name or ID.
    ///
    /// Used both to clear a stale container left by a crashed batch and to
    /// tear down a run that exceeded its timeout. Racing against
    /// auto-remove is fine; the caller ignores the result.
    pub async fn force_remove(&self, id: &str) -> Result<(), Error> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker.remove_container(id, Some(options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_spec_builder() {
        let spec = ContainerSpec::new("scan-forge-octocat_Hello-World_abc123", "example/scanner:1")
            .with_bind("/tmp/tree", "/data/project")
            .with_bind("/tmp/results", "/data/results")
            .with_env("SCANNER_TOKEN", "secret");

        assert_eq!(spec.name, "scan-forge-octocat_Hello-World_abc123");
        assert_eq!(spec.image, "example/scanner:1");
        assert_eq!(spec.binds.len(), 2);
        assert_eq!(spec.binds[0], "/tmp/tree:/data/project:rw");
        assert_eq!(spec.env, vec!["SCANNER_TOKEN=secret".to_string()]);
    }
}
