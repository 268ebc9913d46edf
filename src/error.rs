// src/error.rs

//! Unified error handling for the audit application.

use std::fmt;

use thiserror::Error;

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid run configuration, raised before any I/O
    #[error("Configuration error: {message}")]
    Config { message: String, hint: Option<String> },

    /// Pre-flight access check failed for a target repository
    #[error("Repository access error: cannot read {repository}")]
    RepositoryAccess { repository: String },

    /// A scan kept failing after the retry budget was spent
    #[error("Scan of {repository} failed after {attempts} attempts: {message}")]
    Scan {
        repository: String,
        attempts: u32,
        message: String,
    },

    /// Rate limiting persisted past the scan retry budget
    #[error("Rate limit for {repository} did not clear after {attempts} attempts")]
    RateLimited { repository: String, attempts: u32 },

    /// A wait was interrupted by a cancellation request
    #[error("Operation cancelled")]
    Cancelled,

    /// Processed-story or metadata input could not be used
    #[error("Catalog error in {source_path}: {message}")]
    Catalog {
        source_path: String,
        message: String,
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
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Create a configuration error with a remediation hint.
    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Create a repository access error.
    pub fn repository_access(repository: impl Into<String>) -> Self {
        Self::RepositoryAccess {
            repository: repository.into(),
        }
    }

    /// Create a scan failure after retries were exhausted.
    pub fn scan(repository: impl Into<String>, attempts: u32, message: impl fmt::Display) -> Self {
        Self::Scan {
            repository: repository.into(),
            attempts,
            message: message.to_string(),
        }
    }

    /// Create a catalog error for the given input file.
    pub fn catalog(source_path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Catalog {
            source_path: source_path.into(),
            message: message.to_string(),
        }
    }

    /// Short name of the error class, used in user-facing output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Config { .. } => "ConfigurationError",
            Self::RepositoryAccess { .. } => "RepositoryAccessError",
            Self::Scan { .. } => "TransientScanError",
            Self::RateLimited { .. } => "RateLimitCondition",
            Self::Cancelled => "Cancelled",
            Self::Catalog { .. } => "CatalogError",
            Self::Io(_) | Self::Http(_) | Self::Json(_) | Self::Toml(_) | Self::Url(_) => {
                "InfrastructureError"
            }
        }
    }

    /// Remediation hint for the user, if one applies.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Config { hint, .. } => hint.clone(),
            Self::RepositoryAccess { repository } => Some(format!(
                "check that the token can read issues in {repository}"
            )),
            Self::Scan { .. } => Some("check network connectivity and retry".to_string()),
            Self::RateLimited { .. } => {
                Some("wait for the rate limit window to reset, then rerun".to_string())
            }
            Self::Catalog { .. } => {
                Some("fix the input file; story numbers must be unique positive integers".into())
            }
            _ => None,
        }
    }

    /// Whether a failed scan attempt may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Http(_))
    }
}
