//! Error types for the bridge, the capture sinks and configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a capture sink outside of per-frame submission.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("capture sink refused to allocate an instance: {0}")]
    InstanceUnavailable(String),
}

/// Errors returned by [`crate::bridge::FrameSinkBridge`].
///
/// Per-frame sink outcomes are never errors; these only cover startup
/// failure and calls made in the wrong lifecycle state.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to create capture instance")]
    InstanceCreation(#[source] SinkError),

    #[error("bridge is not initialized")]
    NotInitialized,

    #[error("bridge has already been shut down")]
    ShutDown,

    #[error("capture is disabled because the instance could not be created")]
    CaptureDisabled,

    #[error("invalid lifecycle transition: {0}")]
    InvalidState(&'static str),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid size {0:?}, expected WIDTHxHEIGHT")]
    InvalidSize(String),
}
