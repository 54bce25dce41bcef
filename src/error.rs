// src/error.rs

//! Unified error handling for the harvester.
//!
//! Two layers:
//! - [`CallError`] classifies a single outbound HTTP call. These are contained
//!   per item (one thread, one classifier call) and never abort a run.
//! - [`AppError`] is what pipeline entry points return. Only configuration
//!   problems and record store I/O failures end up here in practice.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Outbound call failed
    #[error(transparent)]
    Call(#[from] CallError),

    /// Background task panicked or was aborted
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration error (missing credentials, unreadable config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration value out of range
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Outcome of a single failed outbound call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The request did not complete within the client timeout
    #[error("timeout calling {endpoint}")]
    Timeout { endpoint: String },

    /// The provider kept throttling until the attempt budget ran out
    #[error("rate limited by {endpoint} after {attempts} attempt(s)")]
    RateLimited { endpoint: String, attempts: u32 },

    /// Non-throttling 5xx response
    #[error("server error from {endpoint}: {status} {body}")]
    ServerError {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Non-throttling 4xx (or otherwise unexpected) response
    #[error("client error from {endpoint}: {status} {body}")]
    ClientError {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Connection refused, DNS failure, reset, ...
    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// 2xx response whose body could not be decoded
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

impl CallError {
    /// Classify a transport-level failure from reqwest.
    pub fn from_reqwest(endpoint: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if error.is_decode() {
            Self::invalid_response(endpoint, error)
        } else {
            Self::Network {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Classify a non-success HTTP status.
    ///
    /// 429 maps to a single-attempt `RateLimited`; the retry loop decides
    /// whether it is terminal.
    pub fn from_status(endpoint: &str, status: StatusCode, body: String) -> Self {
        let endpoint = endpoint.to_string();
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited {
                endpoint,
                attempts: 1,
            }
        } else if status.is_server_error() {
            Self::ServerError {
                endpoint,
                status: status.as_u16(),
                body,
            }
        } else {
            Self::ClientError {
                endpoint,
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(endpoint: &str, message: impl fmt::Display) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the provider asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the failure is a transient network condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }
}
