// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while turning a request path into a response.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Traversal attempt, or a file kind that may not be served.
    #[error("forbidden path: {0}")]
    ForbiddenPath(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::ForbiddenPath(_) => StatusCode::FORBIDDEN,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ServeError::Io(e) => error!("Failed to serve request: {}", e),
            other => debug!("Request rejected: {}", other),
        }
        let body = match status {
            StatusCode::FORBIDDEN => "403 Forbidden",
            StatusCode::NOT_FOUND => "404 Not Found",
            _ => "500 Internal Server Error",
        };
        (status, body).into_response()
    }
}

/// Errors that stop the process before any socket is bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("directory does not exist: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    #[error("invalid configuration: {0}")]
    Figment(#[from] figment::Error),
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
}
