//! Boosted tree ensembles built on smartcore trees.
//!
//! - `GradientBoostingClassifier`: binary log-loss boosting with depth-limited
//!   regression trees fitted on pseudo-residuals of a row subsample; each
//!   leaf then takes the Newton step `sum(r) / sum(p * (1 - p))`.
//! - `AdaBoostClassifier`: multi-class SAMME over decision stumps; sample
//!   weights are applied by weighted resampling since smartcore trees take
//!   no per-sample weights.

use std::collections::BTreeMap;

use ndarray::{ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::DecisionTreeClassifierParameters;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::classifier::{to_dense, Tree};
use crate::error::{NetGuardError, Result};

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

const PROBA_EPS: f64 = 1e-6;
const NEWTON_MIN_HESSIAN: f64 = 1e-150;

/// Sorted distinct labels.
pub(crate) fn unique_classes(y: &[i32]) -> Vec<i32> {
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

fn check_shapes(x: &ArrayView2<f64>, y: &[i32]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(NetGuardError::Validation(format!(
            "feature rows {} != label count {}",
            x.nrows(),
            y.len()
        )));
    }
    if y.is_empty() {
        return Err(NetGuardError::Validation("cannot fit on zero samples".to_string()));
    }
    Ok(())
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub learning_rate: f64,
    pub n_estimators: usize,
    /// Fraction of rows drawn (without replacement) for each stage
    pub subsample: f64,
    pub max_depth: u16,
    pub seed: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            n_estimators: 100,
            subsample: 1.0,
            max_depth: 3,
            seed: 42,
        }
    }
}

impl GradientBoostingParams {
    fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(NetGuardError::Validation(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(NetGuardError::Validation(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.n_estimators == 0 || self.max_depth == 0 {
            return Err(NetGuardError::Validation(
                "n_estimators and max_depth must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One boosting stage: a regression tree whose leaves are re-valued by a
/// Newton step on the log-loss.
///
/// smartcore does not expose leaf ids, so leaves are keyed by the bit pattern
/// of the tree's raw output. Leaves that share an output are merged, which
/// yields the Newton step over their union.
#[derive(Serialize, Deserialize)]
struct BoostingStage {
    tree: RegressionTree,
    /// `(raw output bits, Newton value)`, sorted by key
    leaf_values: Vec<(u64, f64)>,
}

impl BoostingStage {
    fn fit(
        x: &DenseMatrix<f64>,
        residuals: &[f64],
        hessians: &[f64],
        params: &DecisionTreeRegressorParameters,
    ) -> Result<Self> {
        let tree = RegressionTree::fit(x, &residuals.to_vec(), params.clone())?;

        let mut sums: BTreeMap<u64, (f64, f64)> = BTreeMap::new();
        for ((leaf, r), h) in tree.predict(x)?.into_iter().zip(residuals).zip(hessians) {
            let entry = sums.entry(leaf.to_bits()).or_default();
            entry.0 += r;
            entry.1 += h;
        }
        let leaf_values = sums
            .into_iter()
            .map(|(key, (num, den))| {
                let value = if den.abs() < NEWTON_MIN_HESSIAN { 0.0 } else { num / den };
                (key, value)
            })
            .collect();

        Ok(Self { tree, leaf_values })
    }

    fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>> {
        Ok(self
            .tree
            .predict(x)?
            .into_iter()
            .map(|leaf| {
                self.leaf_values
                    .binary_search_by_key(&leaf.to_bits(), |(key, _)| *key)
                    .map_or(leaf, |i| self.leaf_values[i].1)
            })
            .collect())
    }
}

#[derive(Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    classes: Vec<i32>,
    init_score: f64,
    learning_rate: f64,
    stages: Vec<BoostingStage>,
}

impl GradientBoostingClassifier {
    pub fn fit(x: ArrayView2<f64>, y: &[i32], params: &GradientBoostingParams) -> Result<Self> {
        params.validate()?;
        check_shapes(&x, y)?;

        let classes = unique_classes(y);
        match classes.len() {
            1 => {
                return Ok(Self {
                    classes,
                    init_score: 0.0,
                    learning_rate: params.learning_rate,
                    stages: Vec::new(),
                })
            }
            2 => {}
            n => {
                return Err(NetGuardError::Validation(format!(
                    "gradient boosting supports binary labels, got {n} classes"
                )))
            }
        }

        let target: Vec<f64> = y
            .iter()
            .map(|&label| if label == classes[1] { 1.0 } else { 0.0 })
            .collect();
        let n = target.len();
        let prior = (target.iter().sum::<f64>() / n as f64).clamp(PROBA_EPS, 1.0 - PROBA_EPS);
        let init_score = (prior / (1.0 - prior)).ln();

        let full = to_dense(x)?;
        let mut raw = vec![init_score; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((params.subsample * n as f64).round() as usize).clamp(1, n);
        let tree_params = DecisionTreeRegressorParameters::default().with_max_depth(params.max_depth);

        let mut stages = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let proba: Vec<f64> = raw.iter().map(|f| sigmoid(*f)).collect();
            let residuals: Vec<f64> = target.iter().zip(&proba).map(|(t, p)| t - p).collect();
            let hessians: Vec<f64> = proba.iter().map(|p| p * (1.0 - p)).collect();

            // leaf values come from the in-bag rows only
            let stage = if sample_size < n {
                let mut idx = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                idx.sort_unstable();
                let xs = to_dense(x.select(Axis(0), &idx).view())?;
                let rs: Vec<f64> = idx.iter().map(|&i| residuals[i]).collect();
                let hs: Vec<f64> = idx.iter().map(|&i| hessians[i]).collect();
                BoostingStage::fit(&xs, &rs, &hs, &tree_params)?
            } else {
                BoostingStage::fit(&full, &residuals, &hessians, &tree_params)?
            };

            let update = stage.predict(&full)?;
            for (f, u) in raw.iter_mut().zip(update) {
                *f += params.learning_rate * u;
            }
            stages.push(stage);
        }

        Ok(Self {
            classes,
            init_score,
            learning_rate: params.learning_rate,
            stages,
        })
    }

    /// Raw log-odds of the positive (larger) class per row.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        let mut raw = vec![self.init_score; x.nrows()];
        if self.stages.is_empty() {
            return Ok(raw);
        }
        let dense = to_dense(x)?;
        for stage in &self.stages {
            let update = stage.predict(&dense)?;
            for (f, u) in raw.iter_mut().zip(update) {
                *f += self.learning_rate * u;
            }
        }
        Ok(raw)
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<i32>> {
        if self.classes.len() == 1 {
            return Ok(vec![self.classes[0]; x.nrows()]);
        }
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|f| if f > 0.0 { self.classes[1] } else { self.classes[0] })
            .collect())
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    pub learning_rate: f64,
    pub n_estimators: usize,
    pub seed: u64,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            n_estimators: 50,
            seed: 42,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    classes: Vec<i32>,
    estimators: Vec<Tree>,
    estimator_weights: Vec<f64>,
}

impl AdaBoostClassifier {
    pub fn fit(x: ArrayView2<f64>, y: &[i32], params: &AdaBoostParams) -> Result<Self> {
        if !(params.learning_rate > 0.0) || params.n_estimators == 0 {
            return Err(NetGuardError::Validation(
                "AdaBoost needs learning_rate > 0 and n_estimators > 0".to_string(),
            ));
        }
        check_shapes(&x, y)?;

        let classes = unique_classes(y);
        let n_classes = classes.len();
        if n_classes == 1 {
            return Ok(Self {
                classes,
                estimators: Vec::new(),
                estimator_weights: Vec::new(),
            });
        }

        let n = y.len();
        let full = to_dense(x)?;
        let stump_params = DecisionTreeClassifierParameters::default().with_max_depth(1);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut sample_weight = vec![1.0 / n as f64; n];
        let mut estimators = Vec::with_capacity(params.n_estimators);
        let mut estimator_weights = Vec::with_capacity(params.n_estimators);

        for iboost in 0..params.n_estimators {
            let dist = WeightedIndex::new(&sample_weight)
                .map_err(|e| NetGuardError::Validation(format!("invalid sample weights: {e}")))?;
            let idx: Vec<usize> = (0..n).map(|_| dist.sample(&mut rng)).collect();
            let xs = to_dense(x.select(Axis(0), &idx).view())?;
            let ys: Vec<i32> = idx.iter().map(|&i| y[i]).collect();

            let stump = Tree::fit(&xs, &ys, stump_params.clone())?;
            let pred = stump.predict(&full)?;
            let incorrect: Vec<bool> = pred.iter().zip(y).map(|(p, t)| p != t).collect();

            let total: f64 = sample_weight.iter().sum();
            let error = incorrect
                .iter()
                .zip(&sample_weight)
                .filter(|(miss, _)| **miss)
                .map(|(_, w)| w)
                .sum::<f64>()
                / total;

            // Perfect fit: this stump alone decides.
            if error <= 0.0 {
                estimators.push(stump);
                estimator_weights.push(1.0);
                break;
            }

            if error >= 1.0 - 1.0 / n_classes as f64 {
                if estimators.is_empty() {
                    return Err(NetGuardError::Validation(
                        "AdaBoost base estimator is no better than random guessing".to_string(),
                    ));
                }
                break;
            }

            let alpha = params.learning_rate
                * (((1.0 - error) / error).ln() + ((n_classes - 1) as f64).ln());
            estimators.push(stump);
            estimator_weights.push(alpha);

            if iboost + 1 == params.n_estimators {
                break;
            }

            for (w, miss) in sample_weight.iter_mut().zip(&incorrect) {
                if *miss {
                    *w *= alpha.exp();
                }
            }
            let sum: f64 = sample_weight.iter().sum();
            sample_weight.iter_mut().for_each(|w| *w /= sum);
        }

        Ok(Self {
            classes,
            estimators,
            estimator_weights,
        })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<i32>> {
        let rows = x.nrows();
        if self.estimators.is_empty() {
            return Ok(vec![self.classes[0]; rows]);
        }

        let dense = to_dense(x)?;
        let mut votes = vec![vec![0.0_f64; self.classes.len()]; rows];
        for (stump, weight) in self.estimators.iter().zip(&self.estimator_weights) {
            let pred = stump.predict(&dense)?;
            for (row, label) in pred.iter().enumerate() {
                if let Ok(k) = self.classes.binary_search(label) {
                    votes[row][k] += weight;
                }
            }
        }

        Ok(votes
            .iter()
            .map(|scores| {
                let mut best = 0;
                for (k, s) in scores.iter().enumerate() {
                    if *s > scores[best] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn separable(n: usize) -> (Array2<f64>, Vec<i32>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i % 5) as f64
            }
        });
        let y = (0..n).map(|i| i32::from(i >= n / 2)).collect();
        (x, y)
    }

    fn accuracy(a: &[i32], b: &[i32]) -> f64 {
        a.iter().zip(b).filter(|(p, t)| p == t).count() as f64 / a.len() as f64
    }

    #[test]
    fn gradient_boosting_learns_threshold() {
        let (x, y) = separable(40);
        let params = GradientBoostingParams {
            n_estimators: 20,
            ..GradientBoostingParams::default()
        };
        let model = GradientBoostingClassifier::fit(x.view(), &y, &params).unwrap();
        assert_eq!(model.n_stages(), 20);

        let pred = model.predict(x.view()).unwrap();
        assert!(accuracy(&pred, &y) >= 0.95);
    }

    #[test]
    fn gradient_boosting_leaves_take_newton_steps() {
        // balanced and separable: init 0, residuals +-0.5, hessians 0.25
        let (x, y) = separable(20);
        let params = GradientBoostingParams {
            n_estimators: 1,
            learning_rate: 1.0,
            ..GradientBoostingParams::default()
        };
        let model = GradientBoostingClassifier::fit(x.view(), &y, &params).unwrap();

        let raw = model.decision_function(x.view()).unwrap();
        for (f, label) in raw.iter().zip(&y) {
            let expected = if *label == 1 { 2.0 } else { -2.0 };
            assert!((f - expected).abs() < 1e-9, "raw {f} for label {label}");
        }
    }

    #[test]
    fn gradient_boosting_survives_json_round_trip() {
        let (x, y) = separable(30);
        let params = GradientBoostingParams {
            n_estimators: 5,
            subsample: 0.7,
            ..GradientBoostingParams::default()
        };
        let model = GradientBoostingClassifier::fit(x.view(), &y, &params).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: GradientBoostingClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.decision_function(x.view()).unwrap(),
            model.decision_function(x.view()).unwrap()
        );
    }

    #[test]
    fn gradient_boosting_subsample_is_seeded() {
        let (x, y) = separable(30);
        let params = GradientBoostingParams {
            n_estimators: 8,
            subsample: 0.7,
            ..GradientBoostingParams::default()
        };
        let a = GradientBoostingClassifier::fit(x.view(), &y, &params).unwrap();
        let b = GradientBoostingClassifier::fit(x.view(), &y, &params).unwrap();
        assert_eq!(
            a.decision_function(x.view()).unwrap(),
            b.decision_function(x.view()).unwrap()
        );
    }

    #[test]
    fn gradient_boosting_rejects_multiclass() {
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = vec![0, 1, 2, 0, 1, 2];
        let err = GradientBoostingClassifier::fit(x.view(), &y, &GradientBoostingParams::default());
        assert!(matches!(err, Err(NetGuardError::Validation(_))));
    }

    #[test]
    fn gradient_boosting_single_class_is_constant() {
        let x = Array2::from_shape_fn((4, 1), |(i, _)| i as f64);
        let y = vec![1; 4];
        let model =
            GradientBoostingClassifier::fit(x.view(), &y, &GradientBoostingParams::default())
                .unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), vec![1; 4]);
    }

    #[test]
    fn gradient_boosting_rejects_bad_subsample() {
        let (x, y) = separable(10);
        let params = GradientBoostingParams {
            subsample: 0.0,
            ..GradientBoostingParams::default()
        };
        assert!(GradientBoostingClassifier::fit(x.view(), &y, &params).is_err());
    }

    #[test]
    fn adaboost_stops_on_perfect_stump() {
        let (x, y) = separable(40);
        let params = AdaBoostParams {
            n_estimators: 16,
            ..AdaBoostParams::default()
        };
        let model = AdaBoostClassifier::fit(x.view(), &y, &params).unwrap();
        assert!(model.n_estimators() >= 1);
        assert!(model.n_estimators() <= 16);

        let pred = model.predict(x.view()).unwrap();
        assert!(accuracy(&pred, &y) >= 0.9);
    }

    #[test]
    fn adaboost_single_class_is_constant() {
        let x = Array2::from_shape_fn((3, 2), |(i, j)| (i + j) as f64);
        let y = vec![7, 7, 7];
        let model = AdaBoostClassifier::fit(x.view(), &y, &AdaBoostParams::default()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), vec![7, 7, 7]);
    }

    #[test]
    fn sigmoid_is_symmetric() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid(3.0) + sigmoid(-3.0) - 1.0).abs() < 1e-12);
    }
}
