//! Shared application state and the launch registry.

use crate::config::LaunchConfig;
use crate::error::{Error, Result};
use crate::launcher::{LaunchProcess, Launched};
use crate::ports::PortPair;
use crate::runtime::ContainerRuntime;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A simulator started by this process.
#[derive(Debug)]
pub struct Launch {
    pub container_id: String,
    pub ports: PortPair,
    pub process: LaunchProcess,
    pub started_at: Instant,
}

impl From<Launched> for Launch {
    fn from(launched: Launched) -> Self {
        Self {
            container_id: launched.container_id,
            ports: launched.ports,
            process: launched.process,
            started_at: Instant::now(),
        }
    }
}

/// Launches keyed by container id.
pub type Launches = Arc<RwLock<HashMap<String, Launch>>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LaunchConfig>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub launches: Launches,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: LaunchConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
            launches: Arc::new(RwLock::new(HashMap::new())),
            http: reqwest::Client::new(),
        }
    }

    /// Published ports of a launch this process is tracking.
    pub async fn ports_of(&self, container_id: &str) -> Result<PortPair> {
        self.launches
            .read()
            .await
            .get(container_id)
            .map(|launch| launch.ports)
            .ok_or_else(|| Error::UnknownLaunch(container_id.to_string()))
    }
}
