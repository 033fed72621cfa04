//! Error taxonomy for the diagnosis pipeline.
//!
//! Most pipeline failures are not errors at all: they end the cycle with a
//! [`crate::RunOutcome`]. These variants cover what the caller has to handle.

use std::path::PathBuf;

/// Medic errors.
#[derive(Debug, thiserror::Error)]
pub enum MedicError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown backend: {0} (registered: {1})")]
    UnknownBackend(String, String),

    #[error("backend already registered: {0}")]
    DuplicateBackend(String),

    #[error("no backend available:\n{}", hints.join("\n"))]
    NoBackendAvailable { hints: Vec<String> },

    #[error("no code context found in {path} at line {line}")]
    ContextNotFound { path: PathBuf, line: usize },

    #[error("parser setup failed: {0}")]
    Parser(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for medic operations.
pub type Result<T> = std::result::Result<T, MedicError>;
