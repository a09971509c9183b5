//! Launch configuration assembled from the command line and environment.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the simulator image.
pub const IMAGE_ENV: &str = "SIMULATOR_DOCKER_IMAGE";

/// In-container port the simulator serves HTTP on.
pub const CONTAINER_HTTP_PORT: u16 = 1337;
/// In-container port the simulator serves its websocket channel on.
pub const CONTAINER_WS_PORT: u16 = 2121;
/// Where the staged script directory is mounted inside the container.
pub const CONTAINER_CODE_DIR: &str = "/code";
/// Name of the staged script file.
pub const SCRIPT_FILE: &str = "script.py";

/// How launches are built and supervised.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Image to run. `None` makes every launch fail with `Misconfigured`.
    pub image: Option<String>,
    /// Container runtime CLI, `docker` unless overridden.
    pub runtime: String,
    /// External wall-clock limiter wrapped around the runtime invocation.
    pub timeout_bin: String,
    pub max_runtime: Duration,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub staging_dir: PathBuf,
    /// Extra time a tracked launch is kept after `max_runtime` before the reaper drops it.
    pub retention_grace: Duration,
}

impl LaunchConfig {
    /// Resolve the configured image, failing before any resource is created.
    pub fn image(&self) -> Result<&str> {
        match self.image.as_deref() {
            Some(image) if !image.trim().is_empty() => Ok(image),
            _ => Err(Error::Misconfigured(format!("{IMAGE_ENV} is not set"))),
        }
    }

    /// Age after which a tracked launch is considered finished regardless of its process state.
    pub fn retention(&self) -> Duration {
        self.max_runtime + self.retention_grace
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            image: None,
            runtime: "docker".to_string(),
            timeout_bin: "timeout".to_string(),
            max_runtime: Duration::from_secs(1200),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            staging_dir: std::env::temp_dir(),
            retention_grace: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_is_misconfigured() {
        let config = LaunchConfig::default();
        assert!(matches!(config.image(), Err(Error::Misconfigured(_))));
    }

    #[test]
    fn blank_image_is_misconfigured() {
        let config = LaunchConfig {
            image: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.image(), Err(Error::Misconfigured(_))));
    }

    #[test]
    fn retention_adds_grace_to_runtime() {
        let config = LaunchConfig::default();
        assert_eq!(config.retention(), Duration::from_secs(1500));
    }
}
