use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the model trainer
#[derive(Error, Debug)]
pub enum NetGuardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tracking server returned {status}: {body}")]
    Tracking { status: u16, body: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array file error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    // Model errors
    #[error("Model error: {0}")]
    Model(#[from] smartcore::error::Failed),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Any failure of a pipeline stage, annotated with where it surfaced.
    #[error("Error occurred in {stage} [{file}:{line}]: {source}")]
    Stage {
        stage: &'static str,
        file: &'static str,
        line: u32,
        #[source]
        source: Box<NetGuardError>,
    },
}

impl NetGuardError {
    /// Wrap an error with the stage name and the caller's source location.
    #[track_caller]
    pub fn stage(stage: &'static str, source: NetGuardError) -> Self {
        let location = Location::caller();
        NetGuardError::Stage {
            stage,
            file: location.file(),
            line: location.line(),
            source: Box::new(source),
        }
    }

    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NetGuardError::File {
            path: path.into(),
            source,
        }
    }

    /// Innermost error beneath any stage wrappers.
    pub fn root_cause(&self) -> &NetGuardError {
        match self {
            NetGuardError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for NetGuardError
pub type Result<T> = std::result::Result<T, NetGuardError>;
