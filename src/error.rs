// src/error.rs

//! Error types for Orchard

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Orchard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Orchard
#[derive(Error, Debug)]
pub enum Error {
    /// A requested package has no release matching its constraints
    #[error("No release of {package} matches: {reason}")]
    UnresolvedReference { package: String, reason: String },

    /// Two entries for the same package at different versions
    #[error("Conflicting versions requested: {}", .conflicts.join("; "))]
    ConflictingVersions { conflicts: Vec<String> },

    /// Hard dependency failure for a package
    #[error("Dependency validation failed for {package}: {}", .reasons.join("; "))]
    DependencyValidationFailure { package: String, reasons: Vec<String> },

    /// Resolution emptied a non-empty request
    #[error("No valid packages found")]
    NoValidPackages,

    /// File transaction preflight or apply failure
    #[error("File transaction failed ({}): {}", display_paths(.paths), .messages.join("; "))]
    TransactionCommitFailure {
        paths: Vec<PathBuf>,
        messages: Vec<String>,
    },

    /// Store lock could not be taken
    #[error("Lock error: {0}")]
    LockError(String),

    /// Dependency store written by a newer, incompatible release
    #[error("Dependency store version {found} is newer than supported version {supported}")]
    IncompatibleStore { found: String, supported: String },

    /// Transport level failure
    #[error("Transport error for {url}: {reason}")]
    TransportError {
        url: String,
        reason: String,
        connect_failed: bool,
    },

    /// Redirect chain exceeded the hop limit
    #[error("Too many redirects fetching {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: usize },

    /// Package is not installed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed package reference, version or metadata
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration problem
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error with context
    #[error("IO error: {0}")]
    IoError(String),

    /// Path refused for safety reasons
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Raw IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockError(_))
    }

    /// Whether this is a connection-level transport failure
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Error::TransportError {
                connect_failed: true,
                ..
            }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
