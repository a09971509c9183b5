//! Error taxonomy shared by the launcher, the runtime client and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid submission: {0}")]
    InvalidInput(String),

    #[error("could not reserve a host port: {0}")]
    ResourceExhausted(#[source] std::io::Error),

    #[error("container launch failed: {0}")]
    LaunchFailed(String),

    #[error("container did not signal readiness within {0:?}")]
    LaunchTimeout(Duration),

    #[error("no container with id {0}")]
    ContainerNotFound(String),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("container {0} was not launched by this service")]
    UnknownLaunch(String),

    #[error("simulator unreachable: {0}")]
    Upstream(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::LaunchFailed(_) => StatusCode::BAD_GATEWAY,
            Error::LaunchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::ContainerNotFound(_) => StatusCode::NOT_FOUND,
            Error::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Runtime(_) => StatusCode::BAD_GATEWAY,
            Error::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UnknownLaunch(_) => StatusCode::NOT_FOUND,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code returned in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::ResourceExhausted(_) => "resource_exhausted",
            Error::LaunchFailed(_) => "launch_failed",
            Error::LaunchTimeout(_) => "launch_timeout",
            Error::ContainerNotFound(_) => "container_not_found",
            Error::Misconfigured(_) => "misconfigured",
            Error::Runtime(_) => "runtime_error",
            Error::Io { .. } => "internal",
            Error::UnknownLaunch(_) => "unknown_launch",
            Error::Upstream(_) => "upstream_unreachable",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
