use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ClassificationMetric;
use crate::ml::search::ModelReport;

/// Files produced by the data transformation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

/// Outcome of one model training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub train_metric_artifact: ClassificationMetric,
    pub test_metric_artifact: ClassificationMetric,
    pub best_model_name: String,
    pub model_report: ModelReport,
}
