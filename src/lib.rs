pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod logging;
pub mod ml;
pub mod persistence;
pub mod tracking;
pub mod training;

pub use config::{AppConfig, ModelTrainerConfig};
pub use domain::{ClassificationMetric, DataTransformationArtifact, ModelTrainerArtifact};
pub use error::{NetGuardError, Result};
pub use ml::{ModelBundle, ModelCatalog};
pub use tracking::{ExperimentTracker, InMemoryTracker, MlflowTracker};
pub use training::ModelTrainer;
