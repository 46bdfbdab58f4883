//! Hyperparameter search and model comparison.

use std::fmt;

use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::{debug, info};

use super::catalog::ModelCatalog;
use super::classifier::Classifier;
use super::estimator::Estimator;
use super::metrics::{accuracy, get_classification_score, r2_score};
use super::params::{describe, ParamGrid, ParamSet};
use crate::error::{NetGuardError, Result};

/// Test-set metric used to rank the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    Accuracy,
    #[default]
    F1,
    Precision,
    Recall,
    R2,
}

impl SelectionMetric {
    pub fn score(&self, y_true: &[i32], y_pred: &[i32]) -> Result<f64> {
        match self {
            SelectionMetric::Accuracy => accuracy(y_true, y_pred),
            SelectionMetric::F1 => Ok(get_classification_score(y_true, y_pred)?.f1_score),
            SelectionMetric::Precision => {
                Ok(get_classification_score(y_true, y_pred)?.precision_score)
            }
            SelectionMetric::Recall => Ok(get_classification_score(y_true, y_pred)?.recall_score),
            SelectionMetric::R2 => r2_score(y_true, y_pred),
        }
    }
}

impl fmt::Display for SelectionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionMetric::Accuracy => "accuracy",
            SelectionMetric::F1 => "f1",
            SelectionMetric::Precision => "precision",
            SelectionMetric::Recall => "recall",
            SelectionMetric::R2 => "r2",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Cross-validation folds; below 2 disables cross-validation
    pub cv_folds: usize,
    pub metric: SelectionMetric,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            cv_folds: 3,
            metric: SelectionMetric::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: ParamSet,
    /// Mean cross-validated accuracy of `best_params`; NaN when not cross-validated
    pub best_score: f64,
    pub candidates: usize,
}

/// Test-fold indices per fold, keeping each class spread evenly across folds.
pub fn stratified_folds(y: &[i32], k: usize) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..y.len()).collect();
    // stable: keeps original order within each class
    order.sort_by_key(|&i| y[i]);

    let mut folds = vec![Vec::new(); k];
    for (position, idx) in order.into_iter().enumerate() {
        folds[position % k].push(idx);
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

fn cross_val_accuracy(
    estimator: &Estimator,
    x: ArrayView2<f64>,
    y: &[i32],
    folds: &[Vec<usize>],
) -> f64 {
    let mut total = 0.0;
    for test_idx in folds {
        let mut in_test = vec![false; y.len()];
        test_idx.iter().for_each(|&i| in_test[i] = true);
        let train_idx: Vec<usize> = (0..y.len()).filter(|&i| !in_test[i]).collect();

        let x_train = x.select(Axis(0), &train_idx);
        let y_train: Vec<i32> = train_idx.iter().map(|&i| y[i]).collect();
        let x_test = x.select(Axis(0), test_idx);
        let y_test: Vec<i32> = test_idx.iter().map(|&i| y[i]).collect();

        let score = estimator
            .fit(x_train.view(), &y_train)
            .and_then(|model| model.predict(x_test.view()))
            .and_then(|pred| accuracy(&y_test, &pred));
        match score {
            Ok(s) => total += s,
            Err(e) => {
                debug!("{} fold failed: {}", estimator.name(), e);
                return f64::NAN;
            }
        }
    }
    total / folds.len() as f64
}

/// Index of the first maximum; NaN never beats a number.
fn first_best(scores: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.into_iter().enumerate() {
        best = match best {
            None => Some((i, score)),
            Some((_, b)) if score > b || (b.is_nan() && !score.is_nan()) => Some((i, score)),
            keep => keep,
        };
    }
    best.map(|(i, _)| i)
}

/// Exhaustive search over `grid` scored by cross-validated accuracy.
pub fn grid_search(
    estimator: &Estimator,
    grid: &ParamGrid,
    x: ArrayView2<f64>,
    y: &[i32],
    cv_folds: usize,
) -> Result<GridSearchResult> {
    let combos = grid.combinations();
    if combos.is_empty() {
        return Err(NetGuardError::Validation(format!(
            "parameter grid for {} has a key without candidate values",
            estimator.name()
        )));
    }

    let k = cv_folds.min(y.len());
    if combos.len() == 1 || k < 2 {
        // Nothing to compare; still reject parameters the estimator does not know.
        estimator.with_params(&combos[0])?;
        let candidates = combos.len();
        return Ok(GridSearchResult {
            best_params: combos.into_iter().next().unwrap_or_default(),
            best_score: f64::NAN,
            candidates,
        });
    }

    let folds = stratified_folds(y, k);
    let mut scores = Vec::with_capacity(combos.len());
    for combo in &combos {
        let candidate = estimator.with_params(combo)?;
        let score = cross_val_accuracy(&candidate, x, y, &folds);
        debug!("{} [{}] cv accuracy={:.4}", estimator.name(), describe(combo), score);
        scores.push(score);
    }

    let best = first_best(scores.iter().copied()).unwrap_or(0);
    let candidates = combos.len();
    Ok(GridSearchResult {
        best_score: scores[best],
        best_params: combos.into_iter().nth(best).unwrap_or_default(),
        candidates,
    })
}

/// A catalog entry after search and refit
pub struct EvaluatedModel {
    pub name: String,
    pub params: ParamSet,
    pub cv_score: f64,
    pub test_score: f64,
    pub model: Classifier,
}

/// Per-model row of the comparison report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct ModelScore {
    #[tabled(rename = "Model")]
    pub name: String,
    #[tabled(rename = "Test score", display = "display_score")]
    pub score: f64,
    /// NaN when the grid had a single candidate and was not cross-validated
    #[tabled(rename = "CV accuracy", display = "display_score")]
    pub cv_score: f64,
    #[tabled(rename = "Best params")]
    pub params: String,
}

fn display_score(score: &f64) -> String {
    if score.is_nan() {
        "-".to_string()
    } else {
        format!("{score:.4}")
    }
}

/// Scores of every catalog entry, in catalog order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub metric: SelectionMetric,
    pub scores: Vec<ModelScore>,
}

impl ModelReport {
    pub fn from_models(metric: SelectionMetric, models: &[EvaluatedModel]) -> Self {
        Self {
            metric,
            scores: models
                .iter()
                .map(|m| ModelScore {
                    name: m.name.clone(),
                    score: m.test_score,
                    cv_score: m.cv_score,
                    params: describe(&m.params),
                })
                .collect(),
        }
    }

    /// Highest score; ties go to the earliest entry.
    pub fn best(&self) -> Option<&ModelScore> {
        first_best(self.scores.iter().map(|s| s.score)).map(|i| &self.scores[i])
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.iter().find(|s| s.name == name).map(|s| s.score)
    }

    pub fn to_table(&self) -> String {
        tabled::Table::new(&self.scores).to_string()
    }
}

/// Position of the model to keep: highest test score, first in catalog order on ties.
pub fn select_best(models: &[EvaluatedModel]) -> Option<usize> {
    first_best(models.iter().map(|m| m.test_score))
}

/// Search, refit and test-score every catalog entry in order.
pub fn evaluate_models(
    x_train: ArrayView2<f64>,
    y_train: &[i32],
    x_test: ArrayView2<f64>,
    y_test: &[i32],
    catalog: &ModelCatalog,
    options: &SearchOptions,
) -> Result<Vec<EvaluatedModel>> {
    if catalog.is_empty() {
        return Err(NetGuardError::Validation("model catalog is empty".to_string()));
    }

    let mut evaluated = Vec::with_capacity(catalog.len());
    for entry in catalog.entries() {
        let search = grid_search(&entry.estimator, &entry.grid, x_train, y_train, options.cv_folds)?;
        let model = entry.estimator.with_params(&search.best_params)?.fit(x_train, y_train)?;
        let y_pred = model.predict(x_test)?;
        let test_score = options.metric.score(y_test, &y_pred)?;

        info!(
            "{}: {} candidate(s), best [{}], test {}={:.4}",
            entry.name,
            search.candidates,
            describe(&search.best_params),
            options.metric,
            test_score
        );

        evaluated.push(EvaluatedModel {
            name: entry.name.clone(),
            params: search.best_params,
            cv_score: search.best_score,
            test_score,
            model,
        });
    }
    Ok(evaluated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::params::ParamValue;
    use ndarray::Array2;

    fn dataset(n: usize) -> (Array2<f64>, Vec<i32>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7) % 11) as f64
            }
        });
        let y = (0..n).map(|i| i32::from(i >= n / 2)).collect();
        (x, y)
    }

    #[test]
    fn folds_partition_and_stratify() {
        let y = vec![0, 0, 0, 0, 0, 0, 1, 1, 1];
        let folds = stratified_folds(&y, 3);

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..9).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.iter().filter(|&&i| y[i] == 1).count(), 1);
            assert_eq!(fold.iter().filter(|&&i| y[i] == 0).count(), 2);
        }
    }

    #[test]
    fn first_best_prefers_earliest_and_skips_nan() {
        assert_eq!(first_best([0.5, 0.9, 0.9]), Some(1));
        assert_eq!(first_best([f64::NAN, 0.1]), Some(1));
        assert_eq!(first_best([0.3, f64::NAN]), Some(0));
        assert_eq!(first_best(Vec::<f64>::new()), None);
    }

    #[test]
    fn single_candidate_skips_cross_validation() {
        let (x, y) = dataset(12);
        let result = grid_search(&Estimator::logistic_regression(), &ParamGrid::new(), x.view(), &y, 3)
            .unwrap();
        assert!(result.best_params.is_empty());
        assert!(result.best_score.is_nan());
        assert_eq!(result.candidates, 1);
    }

    #[test]
    fn grid_search_picks_a_deep_enough_tree() {
        // label depends on x0 only; a depth-1 tree suffices, both depths tie
        let (x, y) = dataset(30);
        let grid = ParamGrid::new().with("max_depth", [1_i64, 3]);
        let result = grid_search(&Estimator::decision_tree(), &grid, x.view(), &y, 3).unwrap();

        assert_eq!(result.candidates, 2);
        assert_eq!(result.best_params["max_depth"], ParamValue::Int(1));
        assert!(result.best_score > 0.9);
    }

    #[test]
    fn unknown_grid_key_is_an_error() {
        let (x, y) = dataset(12);
        let grid = ParamGrid::new().with("gamma", [1.0]);
        assert!(grid_search(&Estimator::decision_tree(), &grid, x.view(), &y, 3).is_err());
    }

    #[test]
    fn ties_go_to_first_catalog_entry() {
        let (x, y) = dataset(24);
        let catalog = ModelCatalog::new()
            .with("first", Estimator::decision_tree(), ParamGrid::new())
            .with("second", Estimator::decision_tree(), ParamGrid::new());

        let models =
            evaluate_models(x.view(), &y, x.view(), &y, &catalog, &SearchOptions::default())
                .unwrap();
        assert_eq!(models[0].test_score, models[1].test_score);
        assert_eq!(select_best(&models), Some(0));

        let report = ModelReport::from_models(SelectionMetric::F1, &models);
        assert_eq!(report.best().map(|s| s.name.as_str()), Some("first"));
    }

    #[test]
    fn empty_grid_model_still_contributes_a_score() {
        let (x, mut y) = dataset(40);
        // overlap the classes so the linear model is not fitting separable data
        y.swap(18, 22);
        let catalog = ModelCatalog::new().with(
            "Logistic Regression",
            Estimator::logistic_regression(),
            ParamGrid::new(),
        );

        let models =
            evaluate_models(x.view(), &y, x.view(), &y, &catalog, &SearchOptions::default())
                .unwrap();
        let report = ModelReport::from_models(SelectionMetric::F1, &models);
        let score = report.score("Logistic Regression").unwrap();
        assert!(score.is_finite());
        assert!(score > 0.5);
        let table = report.to_table();
        assert!(table.contains("Logistic Regression"));
        assert!(!table.contains("NaN"));
    }

    #[test]
    fn uncross_validated_scores_render_as_dash() {
        assert_eq!(display_score(&f64::NAN), "-");
        assert_eq!(display_score(&0.81234), "0.8123");
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let (x, y) = dataset(6);
        let result = evaluate_models(
            x.view(),
            &y,
            x.view(),
            &y,
            &ModelCatalog::new(),
            &SearchOptions::default(),
        );
        assert!(result.is_err());
    }
}
