// src/error.rs

//! Unified error handling for the tracker.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A content source could not be reached or its reply could not be read
    #[error("Source {source_name} unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    /// The marker file exists but cannot be parsed
    #[error("Marker store {path} is corrupt: {message}")]
    StoreCorrupt { path: String, message: String },

    /// A single dispatch to a destination failed
    #[error("Delivery to {destination} failed: {message}")]
    DeliveryFailed {
        destination: String,
        message: String,
    },

    /// A stored marker has the wrong kind for the group being evaluated
    #[error("Marker for group {group} is not of kind {expected}")]
    MarkerKind {
        group: String,
        expected: &'static str,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
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

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a source failure error.
    pub fn source_unavailable(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a corrupt store error.
    pub fn store_corrupt(path: &Path, message: impl fmt::Display) -> Self {
        Self::StoreCorrupt {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a delivery failure error.
    pub fn delivery_failed(destination: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::DeliveryFailed {
            destination: destination.into(),
            message: message.to_string(),
        }
    }

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

    /// True for errors that happened while reaching a content source.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}
