//! Error types for routemetrics
//!
//! All errors implement `IntoResponse` for the management HTTP handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Metric '{name}' is already registered as a {existing}, cannot use it as a {requested}")]
    MetricTypeMismatch {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("Failed to initialize metrics policy for route '{route}': {source}")]
    PolicyInitFailed {
        route: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Metrics policy is bound to route '{bound}', cannot attach it to route '{requested}'")]
    PolicyAlreadyBound { bound: String, requested: String },

    #[error("Metrics policy for route '{route}' is already initializing")]
    PolicyInitializing { route: String },

    #[error("Failed to start service {service}: {reason}")]
    ServiceStart {
        service: &'static str,
        reason: String,
    },

    #[error("Failed to bind management interface on {address}: {source}")]
    ManagementBind {
        address: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Exchange processing failed: {0}")]
    Processing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Management handlers only fail on registry errors.
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
