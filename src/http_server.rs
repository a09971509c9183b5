//! HTTP server implementation using Axum.

use crate::error::{Error, Result};
use crate::launcher;
use crate::proxy;
use crate::state::{AppState, Launch, Launches};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tower_http::trace::TraceLayer;
use tracing::info;

/// How often finished launches are swept from the registry.
pub const REAP_INTERVAL_SECS: u64 = 60;

// Request/Response types
#[derive(Deserialize)]
struct RunScriptRequest {
    script_code: String,
}

#[derive(Serialize)]
struct RunScriptResponse {
    message: &'static str,
    container_id: String,
    http_port: u16,
    ws_port: u16,
}

#[derive(Serialize)]
struct LogsResponse {
    logs: String,
}

#[derive(Serialize)]
struct LaunchInfo {
    container_id: String,
    http_port: u16,
    ws_port: u16,
    age_secs: u64,
    running: bool,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/run-script", post(run_script))
        .route("/logs/:container_id", get(get_logs))
        .route("/launches", get(list_launches))
        // Simulator passthrough
        .route("/simulators/:container_id/proxy/*path", any(proxy::forward_http))
        .route("/simulators/:container_id/ws", get(proxy::forward_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server on the given address with the provided state.
pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let launches = state.launches.clone();
    let retention = state.config.retention();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(REAP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            reap_finished_launches(&launches, retention).await;
        }
    });

    let app = router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({ "Hello": "World" }))
}

async fn health() -> &'static str {
    "OK"
}

async fn run_script(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RunScriptRequest>, JsonRejection>,
) -> Result<Json<RunScriptResponse>> {
    let Json(req) = payload.map_err(|e| Error::InvalidInput(e.body_text()))?;
    info!(script_bytes = req.script_code.len(), "POST /run-script");

    let launched = launcher::launch(&state.config, &req.script_code).await?;
    let response = RunScriptResponse {
        message: "Simulator container successfully launched.",
        container_id: launched.container_id.clone(),
        http_port: launched.ports.http_port,
        ws_port: launched.ports.ws_port,
    };

    let launch = Launch::from(launched);
    state
        .launches
        .write()
        .await
        .insert(launch.container_id.clone(), launch);

    Ok(Json(response))
}

async fn get_logs(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Json<LogsResponse>> {
    let logs = state.runtime.logs(&container_id).await?;
    info!(%container_id, log_bytes = logs.len(), "GET /logs");
    Ok(Json(LogsResponse { logs }))
}

async fn list_launches(State(state): State<AppState>) -> Json<Vec<LaunchInfo>> {
    let mut launches = state.launches.write().await;
    let now = Instant::now();
    let list: Vec<LaunchInfo> = launches
        .values_mut()
        .map(|l| LaunchInfo {
            container_id: l.container_id.clone(),
            http_port: l.ports.http_port,
            ws_port: l.ports.ws_port,
            age_secs: now.duration_since(l.started_at).as_secs(),
            running: l.process.is_running(),
        })
        .collect();
    Json(list)
}

/// Drop launches whose runtime process has exited or that outlived `retention`.
pub async fn reap_finished_launches(launches: &Launches, retention: Duration) {
    let mut launches = launches.write().await;
    let now = Instant::now();

    let finished: Vec<String> = launches
        .iter_mut()
        .filter_map(|(id, l)| {
            let exited = !l.process.is_running();
            (exited || now.duration_since(l.started_at) > retention).then(|| id.clone())
        })
        .collect();

    for id in finished {
        if let Some(launch) = launches.remove(&id) {
            info!("Cleaning up finished launch: {}", id);
            // Dropping the process handle stops stragglers and removes staged files.
            drop(launch);
        }
    }
}
