//! Host port reservation for the simulator's published ports.

use crate::error::{Error, Result};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};

/// Host ports published by one simulator container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PortPair {
    pub http_port: u16,
    pub ws_port: u16,
}

/// Ask the OS for two currently unused TCP ports.
///
/// Both sockets are released before returning, so another process may grab
/// either port before the container binds it.
pub fn reserve_pair() -> Result<PortPair> {
    let http = bind_ephemeral()?;
    // Keep the first socket open so the second bind cannot hand back the same port.
    let ws = bind_ephemeral()?;

    Ok(PortPair {
        http_port: local_port(&http)?,
        ws_port: local_port(&ws)?,
    })
}

fn bind_ephemeral() -> Result<TcpListener> {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).map_err(Error::ResourceExhausted)
}

fn local_port(listener: &TcpListener) -> Result<u16> {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(Error::ResourceExhausted)
}
