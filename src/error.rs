// src/error.rs

//! Unified error handling for the enrichment pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for enrichment operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Call did not complete within its deadline
    #[error("Timed out after {secs}s: {context}")]
    Timeout { context: String, secs: u64 },

    /// Circuit breaker rejected the call without invoking it
    #[error("Circuit open for source '{name}'")]
    CircuitOpen { name: String },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream-specific failure
    #[error("Upstream error for {context}: {message}")]
    Upstream { context: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an upstream error with context.
    pub fn upstream(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Upstream {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error represents a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_is_exposed() {
        let err = AppError::Status {
            status: 403,
            url: "https://example.com".into(),
        };
        assert_eq!(err.status_code(), Some(403));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn timeout_and_circuit_flags() {
        let timeout = AppError::Timeout {
            context: "naver_search".into(),
            secs: 10,
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_circuit_open());

        let open = AppError::CircuitOpen {
            name: "daum_cafe".into(),
        };
        assert!(open.is_circuit_open());
        assert_eq!(open.status_code(), None);
    }
}
