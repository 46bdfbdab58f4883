//! Experiment tracking.
//!
//! A run collects scalar metrics and artifact files. [`MlflowTracker`] talks
//! to an MLflow-compatible server; [`InMemoryTracker`] keeps everything in
//! process for offline training and tests.

mod memory;
mod mlflow;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::{InMemoryTracker, RecordedRun};
pub use mlflow::MlflowTracker;

/// Handle to an open tracking run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRun {
    pub run_id: String,
    /// Where the server stores this run's artifacts, when it reports one
    pub artifact_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    async fn start_run(&self) -> Result<TrackingRun>;

    async fn log_metric(&self, run: &TrackingRun, key: &str, value: f64) -> Result<()>;

    /// Upload `local_path` under `artifact_path` inside the run's artifact tree.
    async fn log_artifact(&self, run: &TrackingRun, local_path: &Path, artifact_path: &str)
        -> Result<()>;

    async fn end_run(&self, run: &TrackingRun, status: RunStatus) -> Result<()>;
}
