//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! The analysis stages themselves never fail: malformed records, unresolved
//! correlations and unmatched ids are logged and absorbed. These errors only
//! cover the boundary (reading payloads, loading config, writing reports).

use thiserror::Error;

/// Errors that can occur while decoding a trace payload
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid trace format: {0}")]
    InvalidFormat(String),
}

/// Errors raised by a trace supplier
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trace not found: {0}")]
    NotFound(String),

    #[error("Failed to decode trace: {0}")]
    Parse(#[from] ParseError),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading the analysis config
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Lookups against cached run data
#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("Run '{0}' not found")]
    RunNotFound(String),

    #[error("Worker '{worker}' not found for run '{run}'")]
    WorkerNotFound { run: String, worker: String },
}
