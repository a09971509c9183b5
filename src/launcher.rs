//! Simulator launch: stage the script, reserve ports, start the container and
//! wait for the runtime to report the container id.

use crate::config::{
    LaunchConfig, CONTAINER_CODE_DIR, CONTAINER_HTTP_PORT, CONTAINER_WS_PORT, SCRIPT_FILE,
};
use crate::error::{Error, Result};
use crate::ports::{self, PortPair};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// On-disk layout of one launch.
#[derive(Debug, Clone)]
pub struct StagedScript {
    /// Owns everything below; removing it cleans up the launch.
    pub launch_dir: PathBuf,
    /// Mounted into the container at `/code`.
    pub code_dir: PathBuf,
    /// Sentinel the runtime writes the container id into. Lives outside `code_dir`.
    pub cidfile: PathBuf,
}

/// A container that has started and reported its id.
#[derive(Debug)]
pub struct Launched {
    pub container_id: String,
    pub ports: PortPair,
    pub staged: StagedScript,
    pub process: LaunchProcess,
}

/// Owns the runtime process of one launch and its staging directory.
///
/// Dropping it stops a still-running process and removes the staged files, so
/// a launch abandoned mid-wait (client gone, handler future dropped) does not
/// outlive its request.
#[derive(Debug)]
pub struct LaunchProcess {
    child: Child,
    launch_dir: Option<PathBuf>,
}

impl LaunchProcess {
    pub fn new(child: Child, launch_dir: PathBuf) -> Self {
        Self {
            child,
            launch_dir: Some(launch_dir),
        }
    }

    pub fn launch_dir(&self) -> Option<&Path> {
        self.launch_dir.as_deref()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the process and wait for the staged files to be removed.
    pub async fn abandon(mut self) {
        self.stop();
        if let Some(launch_dir) = self.launch_dir.take() {
            remove_staging(launch_dir).await;
        }
    }

    fn stop(&mut self) {
        if self.is_running() {
            terminate(&mut self.child);
        }
    }
}

impl Drop for LaunchProcess {
    fn drop(&mut self) {
        self.stop();
        let Some(launch_dir) = self.launch_dir.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || destroy_staging(&launch_dir));
            }
            Err(_) => destroy_staging(&launch_dir),
        }
    }
}

/// Run a submitted script in a fresh simulator container.
pub async fn launch(config: &LaunchConfig, script_code: &str) -> Result<Launched> {
    let image = config.image()?;

    let staged = {
        let staging_root = config.staging_dir.clone();
        let script_code = script_code.to_string();
        tokio::task::spawn_blocking(move || stage_script(&staging_root, &script_code))
            .await
            .map_err(|e| Error::io("staging task", std::io::Error::other(e)))??
    };
    let ports = match ports::reserve_pair() {
        Ok(ports) => ports,
        Err(e) => {
            remove_staging(staged.launch_dir.clone()).await;
            return Err(e);
        }
    };

    let args = build_args(config, image, &staged, ports);
    info!(
        launch_dir = ?staged.launch_dir,
        http_port = ports.http_port,
        ws_port = ports.ws_port,
        "Starting simulator container"
    );
    debug!(program = %config.timeout_bin, ?args, "Runtime invocation");

    let child = match Command::new(&config.timeout_bin)
        .args(&args)
        .stdin(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            remove_staging(staged.launch_dir.clone()).await;
            return Err(Error::LaunchFailed(format!(
                "spawn {}: {}",
                config.timeout_bin, e
            )));
        }
    };
    let mut process = LaunchProcess::new(child, staged.launch_dir.clone());

    match wait_for_container_id(
        &staged.cidfile,
        &mut process.child,
        config.ready_timeout,
        config.poll_interval,
    )
    .await
    {
        Ok(container_id) => {
            info!(%container_id, "Simulator container started");
            Ok(Launched {
                container_id,
                ports,
                staged,
                process,
            })
        }
        Err(e) => {
            warn!(error = %e, "Simulator launch abandoned");
            process.abandon().await;
            Err(e)
        }
    }
}

/// Write the script into a fresh launch directory.
pub fn stage_script(staging_root: &Path, script_code: &str) -> Result<StagedScript> {
    let launch_dir = staging_root.join(format!("simlaunch-{}", uuid::Uuid::new_v4()));
    let code_dir = launch_dir.join("code");
    fs::create_dir_all(&code_dir).map_err(|e| Error::io("mkdir staging", e))?;

    // Volume mounts need an absolute host path.
    let launch_dir = fs::canonicalize(&launch_dir).map_err(|e| Error::io("resolve staging", e))?;
    let code_dir = launch_dir.join("code");

    fs::write(code_dir.join(SCRIPT_FILE), script_code)
        .map_err(|e| Error::io("write script", e))?;

    Ok(StagedScript {
        cidfile: launch_dir.join("container.id"),
        launch_dir,
        code_dir,
    })
}

/// Arguments for the timeout wrapper; the first one is the limit in seconds.
pub fn build_args(
    config: &LaunchConfig,
    image: &str,
    staged: &StagedScript,
    ports: PortPair,
) -> Vec<String> {
    vec![
        config.max_runtime.as_secs().max(1).to_string(),
        config.runtime.clone(),
        "run".to_string(),
        "--cidfile".to_string(),
        staged.cidfile.display().to_string(),
        "-v".to_string(),
        format!("{}:{}", staged.code_dir.display(), CONTAINER_CODE_DIR),
        "-p".to_string(),
        format!("{}:{}", ports.http_port, CONTAINER_HTTP_PORT),
        "-p".to_string(),
        format!("{}:{}", ports.ws_port, CONTAINER_WS_PORT),
        image.to_string(),
        "python".to_string(),
        "-u".to_string(),
        format!("{}/{}", CONTAINER_CODE_DIR, SCRIPT_FILE),
    ]
}

/// Poll the sentinel until it holds an id, the runtime exits, or `timeout` passes.
pub async fn wait_for_container_id(
    cidfile: &Path,
    child: &mut Child,
    timeout: Duration,
    interval: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(id) = read_container_id(cidfile).await? {
            return Ok(id);
        }

        let exited = child
            .try_wait()
            .map_err(|e| Error::LaunchFailed(format!("wait on runtime: {}", e)))?;
        if let Some(status) = exited {
            // The id may have landed between the read above and the exit.
            if let Some(id) = read_container_id(cidfile).await? {
                return Ok(id);
            }
            return Err(Error::LaunchFailed(format!(
                "runtime exited ({}) before reporting a container id",
                status
            )));
        }

        if Instant::now() >= deadline {
            return Err(Error::LaunchTimeout(timeout));
        }
        sleep(interval).await;
    }
}

async fn read_container_id(cidfile: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(cidfile).await {
        Ok(content) => {
            let id = content.trim();
            Ok((!id.is_empty()).then(|| id.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("read cidfile", e)),
    }
}

/// Ask the launching process to stop. The timeout wrapper forwards SIGTERM to the runtime CLI.
fn terminate(child: &mut Child) {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => return,
                Err(e) => warn!(pid, error = %e, "SIGTERM failed"),
            }
        }
    }
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Kill failed");
    }
}

async fn remove_staging(launch_dir: PathBuf) {
    if let Err(e) = tokio::task::spawn_blocking(move || destroy_staging(&launch_dir)).await {
        warn!(error = %e, "Staging cleanup task failed");
    }
}

fn destroy_staging(launch_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(launch_dir) {
        if e.kind() != ErrorKind::NotFound {
            warn!(launch_dir = ?launch_dir, error = %e, "Failed to remove staging dir");
        }
    }
}
