use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::data::load_numpy_array_data;
use crate::domain::ModelTrainerArtifact;
use crate::logging::init_logging;
use crate::ml::ModelBundle;
use crate::persistence::save_object;
use crate::tracking::{ExperimentTracker, InMemoryTracker, MlflowTracker};
use crate::training::ModelTrainer;

#[derive(Parser)]
#[command(name = "netguard")]
#[command(version)]
#[command(about = "Train and serve network security classifiers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", global = true)]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the model catalog and persist the best model
    Train,
    /// Classify rows of a feature matrix with a saved bundle
    Predict {
        /// Bundle written by `train`
        #[arg(short, long)]
        bundle: PathBuf,
        /// `.npy` feature matrix (no label column)
        #[arg(short, long)]
        input: PathBuf,
        /// Write predictions as JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Set")]
    set: &'static str,
    #[tabled(rename = "F1")]
    f1: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "Precision")]
    precision: String,
}

fn metrics_table(artifact: &ModelTrainerArtifact) -> String {
    let rows = [
        ("train", &artifact.train_metric_artifact),
        ("test", &artifact.test_metric_artifact),
    ]
    .map(|(set, m)| MetricRow {
        set,
        f1: format!("{:.4}", m.f1_score),
        recall: format!("{:.4}", m.recall_score),
        precision: format!("{:.4}", m.precision_score),
    });
    Table::new(rows).to_string()
}

pub async fn run_train(config_dir: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load_from(config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    let tracker: Arc<dyn ExperimentTracker> = if config.tracking.is_remote() {
        Arc::new(MlflowTracker::from_config(&config.tracking)?)
    } else {
        warn!("Tracking disabled; runs are kept in memory only");
        Arc::new(InMemoryTracker::new())
    };

    let trainer = ModelTrainer::new(
        config.model_trainer_config(Local::now()),
        config.data_transformation.artifact(),
        tracker,
    );
    let artifact = trainer.run().await?;

    println!("{}", artifact.model_report.to_table());
    println!("{}", metrics_table(&artifact));
    println!(
        "Best model: {} -> {}",
        artifact.best_model_name,
        artifact.trained_model_file_path.display()
    );
    Ok(())
}

pub fn run_predict(bundle: &Path, input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let bundle = ModelBundle::load(bundle)
        .with_context(|| format!("loading model bundle {}", bundle.display()))?;
    let x = load_numpy_array_data(input)?;
    let predictions = bundle.predict(x.view())?;

    match output {
        Some(path) => {
            save_object(path, &predictions)?;
            info!("Wrote {} predictions to {}", predictions.len(), path.display());
        }
        None => println!("{}", serde_json::to_string(&predictions)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClassificationMetric;
    use crate::ml::{ModelReport, SelectionMetric};

    #[test]
    fn parses_predict_arguments() {
        let cli = Cli::parse_from([
            "netguard", "predict", "--bundle", "m.json", "--input", "x.npy",
        ]);
        assert_eq!(cli.config_dir, PathBuf::from("config"));
        match cli.command {
            Commands::Predict { bundle, input, output } => {
                assert_eq!(bundle, PathBuf::from("m.json"));
                assert_eq!(input, PathBuf::from("x.npy"));
                assert!(output.is_none());
            }
            Commands::Train => panic!("expected predict"),
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::parse_from(["netguard", "train", "--config-dir", "/etc/netguard"]);
        assert!(matches!(cli.command, Commands::Train));
        assert_eq!(cli.config_dir, PathBuf::from("/etc/netguard"));
    }

    #[test]
    fn metrics_table_lists_both_sets() {
        let metric = ClassificationMetric {
            f1_score: 0.5,
            precision_score: 0.25,
            recall_score: 1.0,
        };
        let artifact = ModelTrainerArtifact {
            trained_model_file_path: PathBuf::from("model.json"),
            train_metric_artifact: metric,
            test_metric_artifact: metric,
            best_model_name: "Decision Tree".to_string(),
            model_report: ModelReport {
                metric: SelectionMetric::F1,
                scores: Vec::new(),
            },
        };
        let table = metrics_table(&artifact);
        assert!(table.contains("train"));
        assert!(table.contains("test"));
        assert!(table.contains("0.2500"));
    }
}
