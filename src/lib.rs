//! simlaunch - HTTP control plane that runs submitted scripts in simulator containers.

pub mod config;
pub mod error;
pub mod http_server;
pub mod launcher;
pub mod ports;
pub mod proxy;
pub mod runtime;
pub mod state;

pub use error::{Error, Result};
