//! Unified error types for Bosun

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Bosun operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Failed to encode JSON output: {0}")]
    Json(#[from] serde_json::Error),

    // Probe errors (the probe could not run, as opposed to reporting absence)
    #[error("Health probe '{probe}' failed to execute: {message}")]
    ProbeFailed { probe: String, message: String },

    // Remediation errors
    #[error("Remediation '{action}' failed to execute: {message}")]
    RemedyFailed { action: String, message: String },

    #[error("{what} timed out after {secs} seconds")]
    Timeout { what: String, secs: u64 },

    // Warden errors
    #[error("Warden is not running (channel closed)")]
    WardenClosed,

    #[error("Failed to start async runtime: {0}")]
    Runtime(String),
}

/// Result type alias for Bosun operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            what: "Health probe 'ping'".to_string(),
            secs: 10,
        };
        assert_eq!(err.to_string(), "Health probe 'ping' timed out after 10 seconds");
    }

    #[test]
    fn test_probe_failed_message() {
        let err = Error::ProbeFailed {
            probe: "ping".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert!(err.to_string().contains("'ping'"));
        assert!(err.to_string().contains("No such file"));
    }
}
