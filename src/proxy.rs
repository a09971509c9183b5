//! Passthrough to a launched simulator's published ports.

use crate::error::{Error, Result};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade},
        Path, RawQuery, State,
    },
    http::{header, HeaderMap, HeaderName, Method},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as UpstreamMessage};
use tracing::{debug, info, warn};

const HOP_BY_HOP: [HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::UPGRADE,
];

/// Forward a request to the simulator's HTTP port and relay its answer.
pub async fn forward_http(
    State(state): State<AppState>,
    Path((container_id, path)): Path<(String, String)>,
    method: Method,
    mut headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response> {
    let ports = state.ports_of(&container_id).await?;

    let mut url = format!("http://127.0.0.1:{}/{}", ports.http_port, path);
    if let Some(query) = query {
        url.push('?');
        url.push_str(&query);
    }
    headers.remove(header::HOST);
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    debug!(%container_id, %method, %url, "Proxying request");

    let upstream = state
        .http
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

    let status = upstream.status();
    let mut upstream_headers = upstream.headers().clone();
    for name in &HOP_BY_HOP {
        upstream_headers.remove(name);
    }
    let body = upstream
        .bytes()
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

    let mut response = (status, body).into_response();
    response.headers_mut().extend(upstream_headers);
    Ok(response)
}

/// Upgrade the client and bridge it to the simulator's websocket port.
pub async fn forward_ws(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let ports = state.ports_of(&container_id).await?;
    let url = format!("ws://127.0.0.1:{}", ports.ws_port);
    Ok(ws.on_upgrade(move |socket| bridge(socket, url, container_id)))
}

async fn bridge(client: WebSocket, url: String, container_id: String) {
    let upstream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%container_id, %url, error = %e, "Simulator websocket unreachable");
            return;
        }
    };
    info!(%container_id, "Websocket bridge open");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let forwarded = match msg {
                ClientMessage::Text(text) => UpstreamMessage::Text(text),
                ClientMessage::Binary(data) => UpstreamMessage::Binary(data),
                ClientMessage::Close(_) => break,
                // Each side answers its own pings.
                ClientMessage::Ping(_) | ClientMessage::Pong(_) => continue,
            };
            if upstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    // Simulator frames go out as text; the browser client parses them as JSON.
    let upstream_to_client = async {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let forwarded = match msg {
                UpstreamMessage::Text(text) => ClientMessage::Text(text),
                UpstreamMessage::Binary(data) => {
                    ClientMessage::Text(String::from_utf8_lossy(&data).into_owned())
                }
                UpstreamMessage::Close(_) => break,
                _ => continue,
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
    info!(%container_id, "Websocket bridge closed");
}
