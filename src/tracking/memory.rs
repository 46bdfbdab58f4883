use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{ExperimentTracker, RunStatus, TrackingRun};
use crate::error::{NetGuardError, Result};

/// Everything logged to one run
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRun {
    pub run_id: String,
    pub status: RunStatus,
    pub metrics: BTreeMap<String, f64>,
    /// `(artifact_path, file name)` pairs in upload order
    pub artifacts: Vec<(String, PathBuf)>,
}

/// Tracker that keeps runs in memory
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    runs: Mutex<Vec<RecordedRun>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every run started so far, in start order.
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut RecordedRun) -> T) -> Result<T> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| NetGuardError::Internal("tracker lock poisoned".to_string()))?;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| NetGuardError::Validation(format!("unknown run {run_id}")))?;
        if run.status != RunStatus::Running {
            return Err(NetGuardError::Validation(format!(
                "run {run_id} is already {}",
                run.status
            )));
        }
        Ok(f(run))
    }
}

#[async_trait]
impl ExperimentTracker for InMemoryTracker {
    async fn start_run(&self) -> Result<TrackingRun> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| NetGuardError::Internal("tracker lock poisoned".to_string()))?;
        let run_id = format!("run-{}", runs.len());
        runs.push(RecordedRun {
            run_id: run_id.clone(),
            status: RunStatus::Running,
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        });
        debug!("started in-memory run {}", run_id);
        Ok(TrackingRun {
            run_id,
            artifact_uri: None,
        })
    }

    async fn log_metric(&self, run: &TrackingRun, key: &str, value: f64) -> Result<()> {
        self.with_run(&run.run_id, |r| {
            r.metrics.insert(key.to_string(), value);
        })
    }

    async fn log_artifact(
        &self,
        run: &TrackingRun,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<()> {
        if !local_path.is_file() {
            return Err(NetGuardError::file(
                local_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact is not a file"),
            ));
        }
        let name = PathBuf::from(local_path.file_name().unwrap_or_default());
        self.with_run(&run.run_id, |r| {
            r.artifacts.push((artifact_path.to_string(), name));
        })
    }

    async fn end_run(&self, run: &TrackingRun, status: RunStatus) -> Result<()> {
        self.with_run(&run.run_id, |r| r.status = status)
    }
}
