//! Container runtime management API.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bollard::container::LogsOptions;
use bollard::errors::Error as DockerError;
use bollard::Docker;
use futures_util::TryStreamExt;

/// Read access to containers the runtime knows about, whoever started them.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Captured stdout and stderr of a container, in arrival order.
    async fn logs(&self, container_id: &str) -> Result<String>;
}

/// Docker Engine API client.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    /// No request is made until the first call.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Runtime(format!("connect: {}", e)))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn logs(&self, container_id: &str) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let frames: Vec<_> = self
            .docker
            .logs(container_id, Some(options))
            .try_collect()
            .await
            .map_err(|e| map_docker_error(container_id, e))?;

        let bytes: Vec<u8> = frames
            .into_iter()
            .flat_map(|frame| frame.into_bytes())
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn map_docker_error(container_id: &str, err: DockerError) -> Error {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::ContainerNotFound(container_id.to_string()),
        other => Error::Runtime(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_404_is_not_found() {
        let err = map_docker_error(
            "deadbeef",
            DockerError::DockerResponseServerError {
                status_code: 404,
                message: "No such container: deadbeef".to_string(),
            },
        );
        assert!(matches!(err, Error::ContainerNotFound(id) if id == "deadbeef"));
    }

    #[test]
    fn other_docker_errors_are_runtime_errors() {
        let err = map_docker_error(
            "deadbeef",
            DockerError::DockerResponseServerError {
                status_code: 500,
                message: "boom".to_string(),
            },
        );
        assert!(matches!(err, Error::Runtime(_)));
    }
}
