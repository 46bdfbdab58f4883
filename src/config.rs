use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::DataTransformationArtifact;
use crate::ml::search::SelectionMetric;

pub const MODEL_TRAINER_DIR_NAME: &str = "model_trainer";
pub const MODEL_TRAINER_TRAINED_MODEL_DIR: &str = "trained_model";
pub const MODEL_FILE_NAME: &str = "model.json";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub data_transformation: DataTransformationConfig,
    #[serde(default)]
    pub model_trainer: ModelTrainerSettings,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Root directory that receives one timestamped folder per pipeline run
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// chrono format used for the per-run folder name
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("Artifacts")
}

fn default_timestamp_format() -> String {
    "%m_%d_%Y_%H_%M_%S".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

/// Outputs of the upstream data transformation stage
#[derive(Debug, Clone, Deserialize)]
pub struct DataTransformationConfig {
    /// Transformed training array (`.npy`, label in the last column)
    pub train_file_path: PathBuf,
    /// Transformed test array (`.npy`, label in the last column)
    pub test_file_path: PathBuf,
    /// Saved preprocessing object (JSON)
    pub preprocessor_file_path: PathBuf,
}

impl DataTransformationConfig {
    pub fn artifact(&self) -> DataTransformationArtifact {
        DataTransformationArtifact {
            transformed_object_file_path: self.preprocessor_file_path.clone(),
            transformed_train_file_path: self.train_file_path.clone(),
            transformed_test_file_path: self.test_file_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTrainerSettings {
    /// Explicit bundle path; defaults to `<run dir>/model_trainer/trained_model/model.json`
    #[serde(default)]
    pub model_trained_file_path: Option<PathBuf>,
    /// Extra copy of the raw best model (empty string disables it)
    #[serde(default = "default_final_model_path")]
    pub final_model_path: Option<PathBuf>,
    /// Test-set metric used to rank the catalog
    #[serde(default)]
    pub selection_metric: SelectionMetric,
    /// Cross-validation folds used by the grid search
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Seed for every stochastic estimator
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_final_model_path() -> Option<PathBuf> {
    Some(PathBuf::from("final_model").join(MODEL_FILE_NAME))
}

fn default_cv_folds() -> usize {
    3
}

fn default_seed() -> u64 {
    42
}

impl Default for ModelTrainerSettings {
    fn default() -> Self {
        Self {
            model_trained_file_path: None,
            final_model_path: default_final_model_path(),
            selection_metric: SelectionMetric::default(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
        }
    }
}

/// Experiment tracking endpoint and credentials
#[derive(Clone, Deserialize)]
pub struct TrackingConfig {
    /// Disable to keep runs in memory only
    #[serde(default = "default_tracking_enabled")]
    pub enabled: bool,
    /// MLflow tracking server base URI
    #[serde(default)]
    pub uri: Option<String>,
    /// Experiment name; the server default experiment when unset
    #[serde(default)]
    pub experiment_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_tracking_timeout")]
    pub timeout_secs: u64,
}

fn default_tracking_enabled() -> bool {
    true
}

fn default_tracking_timeout() -> u64 {
    60
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: default_tracking_enabled(),
            uri: None,
            experiment_name: None,
            username: None,
            password: None,
            token: None,
            timeout_secs: default_tracking_timeout(),
        }
    }
}

impl fmt::Debug for TrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("TrackingConfig")
            .field("enabled", &self.enabled)
            .field("uri", &self.uri)
            .field("experiment_name", &self.experiment_name)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("token", &redact(&self.token))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TrackingConfig {
    /// Fill unset fields from the conventional MLflow environment variables.
    pub fn with_env_fallback(mut self) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        self.uri = self.uri.or_else(|| env("MLFLOW_TRACKING_URI"));
        self.username = self.username.or_else(|| env("MLFLOW_TRACKING_USERNAME"));
        self.password = self.password.or_else(|| env("MLFLOW_TRACKING_PASSWORD"));
        self.token = self.token.or_else(|| env("MLFLOW_TRACKING_TOKEN"));
        self.experiment_name = self
            .experiment_name
            .or_else(|| env("MLFLOW_EXPERIMENT_NAME"));
        self
    }

    pub fn is_remote(&self) -> bool {
        self.enabled && self.uri.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted console logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file; console only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

/// Per-run directory layout derived from the pipeline settings
#[derive(Debug, Clone)]
pub struct TrainingPipelineConfig {
    pub timestamp: String,
    pub artifact_dir: PathBuf,
}

impl TrainingPipelineConfig {
    pub fn new(pipeline: &PipelineConfig, now: DateTime<Local>) -> Self {
        let timestamp = now.format(&pipeline.timestamp_format).to_string();
        Self {
            artifact_dir: pipeline.artifact_dir.join(&timestamp),
            timestamp,
        }
    }
}

/// Resolved settings handed to the model trainer
#[derive(Debug, Clone)]
pub struct ModelTrainerConfig {
    pub model_trained_file_path: PathBuf,
    pub final_model_path: Option<PathBuf>,
    pub selection_metric: SelectionMetric,
    pub cv_folds: usize,
    pub seed: u64,
}

impl ModelTrainerConfig {
    pub fn new(pipeline: &TrainingPipelineConfig, settings: &ModelTrainerSettings) -> Self {
        let model_trained_file_path = settings.model_trained_file_path.clone().unwrap_or_else(|| {
            pipeline
                .artifact_dir
                .join(MODEL_TRAINER_DIR_NAME)
                .join(MODEL_TRAINER_TRAINED_MODEL_DIR)
                .join(MODEL_FILE_NAME)
        });

        Self {
            model_trained_file_path,
            final_model_path: settings
                .final_model_path
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            selection_metric: settings.selection_metric,
            cv_folds: settings.cv_folds,
            seed: settings.seed,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("model_trainer.cv_folds", 3)?
            .set_default("tracking.enabled", true)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("NETGUARD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (NETGUARD__TRACKING__URI, etc.)
            .add_source(
                Environment::with_prefix("NETGUARD")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.tracking = cfg.tracking.with_env_fallback();
        Ok(cfg)
    }

    pub fn model_trainer_config(&self, now: DateTime<Local>) -> ModelTrainerConfig {
        let pipeline = TrainingPipelineConfig::new(&self.pipeline, now);
        ModelTrainerConfig::new(&pipeline, &self.model_trainer)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.model_trainer.cv_folds == 1 {
            errors.push("cv_folds must be 0 (disabled) or at least 2".to_string());
        }

        if self.tracking.enabled {
            match &self.tracking.uri {
                Some(uri) => {
                    if let Err(e) = url::Url::parse(uri) {
                        errors.push(format!("tracking.uri is not a valid URL ({e}): {uri}"));
                    }
                }
                None => errors.push(
                    "tracking.uri (or MLFLOW_TRACKING_URI) is required when tracking is enabled"
                        .to_string(),
                ),
            }
            if self.tracking.username.is_some() != self.tracking.password.is_some() {
                errors.push("tracking.username and tracking.password must be set together".to_string());
            }
        }

        if self.tracking.timeout_secs == 0 {
            errors.push("tracking.timeout_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
