//! Model trainer stage: search the catalog, track, and persist the winner.

use std::sync::Arc;

use ndarray::Array2;
use tracing::{info, warn};

use crate::config::{ModelTrainerConfig, MODEL_FILE_NAME};
use crate::data::{load_numpy_array_data, split_features_labels};
use crate::domain::{ClassificationMetric, DataTransformationArtifact, ModelTrainerArtifact};
use crate::error::{NetGuardError, Result};
use crate::ml::search::select_best;
use crate::ml::{
    evaluate_models, get_classification_score, Classifier, ModelBundle, ModelCatalog,
    ModelReport, Preprocessor, SearchOptions,
};
use crate::persistence::{load_object, save_object};
use crate::tracking::{ExperimentTracker, RunStatus, TrackingRun};

const STAGE_NAME: &str = "model trainer";
const MODEL_ARTIFACT_PATH: &str = "model";

/// Result of the blocking fit-and-score phase
struct FitOutcome {
    best_name: String,
    best_model: Classifier,
    report: ModelReport,
    train_metric: ClassificationMetric,
    test_metric: ClassificationMetric,
}

pub struct ModelTrainer {
    config: ModelTrainerConfig,
    transformation: DataTransformationArtifact,
    catalog: ModelCatalog,
    tracker: Arc<dyn ExperimentTracker>,
}

impl ModelTrainer {
    /// Trainer over the standard catalog, seeded from `config`.
    pub fn new(
        config: ModelTrainerConfig,
        transformation: DataTransformationArtifact,
        tracker: Arc<dyn ExperimentTracker>,
    ) -> Self {
        let catalog = ModelCatalog::standard().with_seed(config.seed);
        Self {
            config,
            transformation,
            catalog,
            tracker,
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &ModelTrainerConfig {
        &self.config
    }

    /// Load the transformed arrays and train on them.
    ///
    /// Every failure is reported as a [`NetGuardError::Stage`].
    pub async fn run(&self) -> Result<ModelTrainerArtifact> {
        self.load_and_train()
            .await
            .map_err(|e| NetGuardError::stage(STAGE_NAME, e))
    }

    async fn load_and_train(&self) -> Result<ModelTrainerArtifact> {
        info!(
            "Loading transformed arrays from {} and {}",
            self.transformation.transformed_train_file_path.display(),
            self.transformation.transformed_test_file_path.display()
        );
        let train_arr = load_numpy_array_data(&self.transformation.transformed_train_file_path)?;
        let test_arr = load_numpy_array_data(&self.transformation.transformed_test_file_path)?;

        let (x_train, y_train) = split_features_labels(&train_arr)?;
        let (x_test, y_test) = split_features_labels(&test_arr)?;

        self.train(x_train, y_train, x_test, y_test).await
    }

    /// Pick the best catalog model, track its scores, and persist it.
    pub async fn train(
        &self,
        x_train: Array2<f64>,
        y_train: Vec<i32>,
        x_test: Array2<f64>,
        y_test: Vec<i32>,
    ) -> Result<ModelTrainerArtifact> {
        let catalog = self.catalog.clone();
        let options = SearchOptions {
            cv_folds: self.config.cv_folds,
            metric: self.config.selection_metric,
        };

        let outcome = tokio::task::spawn_blocking(move || {
            fit_and_score(&x_train, &y_train, &x_test, &y_test, &catalog, &options)
        })
        .await
        .map_err(|e| NetGuardError::Internal(format!("training task failed: {e}")))??;

        info!(
            "Best model: {} ({}={:.4})",
            outcome.best_name,
            outcome.report.metric,
            outcome.report.score(&outcome.best_name).unwrap_or(f64::NAN)
        );

        self.track_run(&outcome.best_model, &outcome.train_metric).await?;
        self.track_run(&outcome.best_model, &outcome.test_metric).await?;

        let preprocessor: Preprocessor =
            load_object(&self.transformation.transformed_object_file_path)?;
        let FitOutcome {
            best_name,
            best_model,
            report,
            train_metric,
            test_metric,
        } = outcome;

        let bundle = ModelBundle::new(preprocessor, best_model);
        bundle.save(&self.config.model_trained_file_path)?;

        if let Some(final_path) = &self.config.final_model_path {
            save_object(final_path, bundle.model())?;
        }

        let artifact = ModelTrainerArtifact {
            trained_model_file_path: self.config.model_trained_file_path.clone(),
            train_metric_artifact: train_metric,
            test_metric_artifact: test_metric,
            best_model_name: best_name,
            model_report: report,
        };
        info!("Model trainer artifact: {:?}", artifact);
        Ok(artifact)
    }

    /// One tracking run: the three scores plus the serialized model.
    async fn track_run(&self, model: &Classifier, metric: &ClassificationMetric) -> Result<()> {
        let run = self.tracker.start_run().await?;

        match self.log_run(&run, model, metric).await {
            Ok(()) => self.tracker.end_run(&run, RunStatus::Finished).await,
            Err(e) => {
                if let Err(end_err) = self.tracker.end_run(&run, RunStatus::Failed).await {
                    warn!("Could not mark run {} as failed: {}", run.run_id, end_err);
                }
                Err(e)
            }
        }
    }

    async fn log_run(
        &self,
        run: &TrackingRun,
        model: &Classifier,
        metric: &ClassificationMetric,
    ) -> Result<()> {
        for (key, value) in metric.as_pairs() {
            self.tracker.log_metric(run, key, value).await?;
        }

        let dir = tempfile::tempdir()?;
        let model_path = dir.path().join(MODEL_FILE_NAME);
        save_object(&model_path, model)?;
        self.tracker
            .log_artifact(run, &model_path, MODEL_ARTIFACT_PATH)
            .await
    }
}

fn fit_and_score(
    x_train: &Array2<f64>,
    y_train: &[i32],
    x_test: &Array2<f64>,
    y_test: &[i32],
    catalog: &ModelCatalog,
    options: &SearchOptions,
) -> Result<FitOutcome> {
    let models = evaluate_models(
        x_train.view(),
        y_train,
        x_test.view(),
        y_test,
        catalog,
        options,
    )?;
    let report = ModelReport::from_models(options.metric, &models);
    let best = select_best(&models)
        .and_then(|i| models.into_iter().nth(i))
        .ok_or_else(|| NetGuardError::Internal("no model was evaluated".to_string()))?;

    let train_metric = get_classification_score(y_train, &best.model.predict(x_train.view())?)?;
    let test_metric = get_classification_score(y_test, &best.model.predict(x_test.view())?)?;

    Ok(FitOutcome {
        best_name: best.name,
        best_model: best.model,
        report,
        train_metric,
        test_metric,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{Estimator, ParamGrid, SelectionMetric};
    use crate::tracking::MockExperimentTracker;
    use std::path::{Path, PathBuf};

    fn dataset(n: usize) -> (Array2<f64>, Vec<i32>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 5) % 7) as f64
            }
        });
        let y = (0..n).map(|i| i32::from(i >= n / 2)).collect();
        (x, y)
    }

    fn trainer(dir: &Path, tracker: MockExperimentTracker) -> ModelTrainer {
        let preprocessor_path = dir.join("preprocessor.json");
        save_object(&preprocessor_path, &Preprocessor::Identity).unwrap();

        let config = ModelTrainerConfig {
            model_trained_file_path: dir.join("trained_model").join(MODEL_FILE_NAME),
            final_model_path: Some(dir.join("final_model").join(MODEL_FILE_NAME)),
            selection_metric: SelectionMetric::F1,
            cv_folds: 3,
            seed: 42,
        };
        let transformation = DataTransformationArtifact {
            transformed_object_file_path: preprocessor_path,
            transformed_train_file_path: PathBuf::from("unused_train.npy"),
            transformed_test_file_path: PathBuf::from("unused_test.npy"),
        };
        let catalog = ModelCatalog::new()
            .with("Decision Tree", Estimator::decision_tree(), ParamGrid::new())
            .with(
                "Logistic Regression",
                Estimator::logistic_regression(),
                ParamGrid::new(),
            );

        ModelTrainer::new(config, transformation, Arc::new(tracker)).with_catalog(catalog)
    }

    fn open_run() -> Result<TrackingRun> {
        Ok(TrackingRun {
            run_id: "run".to_string(),
            artifact_uri: None,
        })
    }

    #[tokio::test]
    async fn train_opens_two_tracked_runs() {
        let mut tracker = MockExperimentTracker::new();
        tracker.expect_start_run().times(2).returning(open_run);
        tracker
            .expect_log_metric()
            .withf(|_, key: &str, _| {
                matches!(key, "f1_score" | "recall_score" | "precision_score")
            })
            .times(6)
            .returning(|_, _, _| Ok(()));
        tracker
            .expect_log_artifact()
            .withf(|_, path: &Path, artifact_path: &str| {
                artifact_path == "model" && path.is_file()
            })
            .times(2)
            .returning(|_, _, _| Ok(()));
        tracker
            .expect_end_run()
            .withf(|_, status: &RunStatus| *status == RunStatus::Finished)
            .times(2)
            .returning(|_, _| Ok(()));

        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), tracker);
        let (x, y) = dataset(30);

        let artifact = trainer.train(x.clone(), y.clone(), x, y).await.unwrap();

        assert_eq!(artifact.best_model_name, "Decision Tree");
        assert_eq!(artifact.train_metric_artifact.f1_score, 1.0);
        assert!(artifact.trained_model_file_path.is_file());
        assert!(dir.path().join("final_model").join(MODEL_FILE_NAME).is_file());
        assert_eq!(artifact.model_report.scores.len(), 2);
    }

    #[tokio::test]
    async fn failed_logging_marks_run_failed_and_aborts() {
        let mut tracker = MockExperimentTracker::new();
        tracker.expect_start_run().times(1).returning(open_run);
        tracker.expect_log_metric().times(1).returning(|_, _, _| {
            Err(NetGuardError::Tracking {
                status: 503,
                body: "unavailable".to_string(),
            })
        });
        tracker.expect_log_artifact().never();
        tracker
            .expect_end_run()
            .withf(|_, status: &RunStatus| *status == RunStatus::Failed)
            .times(1)
            .returning(|_, _| Ok(()));

        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), tracker);
        let (x, y) = dataset(30);

        let err = trainer.train(x.clone(), y.clone(), x, y).await.unwrap_err();
        assert!(matches!(err, NetGuardError::Tracking { status: 503, .. }));
        assert!(!trainer.config().model_trained_file_path.exists());
    }

    #[tokio::test]
    async fn run_wraps_load_failures_in_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), MockExperimentTracker::new());

        let err = trainer.run().await.unwrap_err();
        match &err {
            NetGuardError::Stage { stage, .. } => assert_eq!(*stage, STAGE_NAME),
            other => panic!("expected stage error, got {other:?}"),
        }
        assert!(matches!(err.root_cause(), NetGuardError::File { .. }));
    }
}
