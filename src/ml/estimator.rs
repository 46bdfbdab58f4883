//! Untrained model specifications.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::RandomForestClassifierParameters;
use smartcore::linear::logistic_regression::LogisticRegressionParameters;
use smartcore::tree::decision_tree_classifier::{DecisionTreeClassifierParameters, SplitCriterion};

use super::boosting::{
    AdaBoostClassifier, AdaBoostParams, GradientBoostingClassifier, GradientBoostingParams,
};
use super::classifier::{to_dense, Classifier, Forest, Logistic, Tree};
use super::params::{ParamSet, ParamValue};
use crate::error::{NetGuardError, Result};

/// Split quality measure for decision trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    /// Information gain; `log_loss` is accepted as an alias
    Entropy,
}

impl FromStr for Criterion {
    type Err = NetGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gini" => Ok(Criterion::Gini),
            "entropy" | "log_loss" => Ok(Criterion::Entropy),
            other => Err(NetGuardError::Validation(format!(
                "unknown split criterion: {other}"
            ))),
        }
    }
}

impl From<Criterion> for SplitCriterion {
    fn from(c: Criterion) -> Self {
        match c {
            Criterion::Gini => SplitCriterion::Gini,
            Criterion::Entropy => SplitCriterion::Entropy,
        }
    }
}

/// A classifier type together with its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest {
        n_estimators: u16,
        max_depth: Option<u16>,
        seed: u64,
    },
    DecisionTree {
        criterion: Criterion,
        max_depth: Option<u16>,
    },
    GradientBoosting(GradientBoostingParams),
    LogisticRegression {
        alpha: f64,
    },
    AdaBoost(AdaBoostParams),
}

impl Estimator {
    pub fn random_forest() -> Self {
        Estimator::RandomForest {
            n_estimators: 100,
            max_depth: None,
            seed: 42,
        }
    }

    pub fn decision_tree() -> Self {
        Estimator::DecisionTree {
            criterion: Criterion::Gini,
            max_depth: None,
        }
    }

    pub fn gradient_boosting() -> Self {
        Estimator::GradientBoosting(GradientBoostingParams::default())
    }

    pub fn logistic_regression() -> Self {
        Estimator::LogisticRegression { alpha: 0.0 }
    }

    pub fn ada_boost() -> Self {
        Estimator::AdaBoost(AdaBoostParams::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Estimator::RandomForest { .. } => "random_forest",
            Estimator::DecisionTree { .. } => "decision_tree",
            Estimator::GradientBoosting(_) => "gradient_boosting",
            Estimator::LogisticRegression { .. } => "logistic_regression",
            Estimator::AdaBoost(_) => "ada_boost",
        }
    }

    /// Reseed every stochastic component.
    pub fn with_seed(mut self, new_seed: u64) -> Self {
        match &mut self {
            Estimator::RandomForest { seed, .. } => *seed = new_seed,
            Estimator::GradientBoosting(p) => p.seed = new_seed,
            Estimator::AdaBoost(p) => p.seed = new_seed,
            Estimator::DecisionTree { .. } | Estimator::LogisticRegression { .. } => {}
        }
        self
    }

    /// Set one hyperparameter by name.
    pub fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<()> {
        let name = self.name();
        let invalid = || {
            NetGuardError::Validation(format!("invalid value {value} for {name}.{key}"))
        };

        match (self, key) {
            (Estimator::RandomForest { n_estimators, .. }, "n_estimators") => {
                *n_estimators = value
                    .as_u64()
                    .and_then(|v| u16::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(invalid)?;
            }
            (Estimator::RandomForest { max_depth, .. }, "max_depth")
            | (Estimator::DecisionTree { max_depth, .. }, "max_depth") => {
                *max_depth = Some(
                    value
                        .as_u64()
                        .and_then(|v| u16::try_from(v).ok())
                        .filter(|v| *v > 0)
                        .ok_or_else(invalid)?,
                );
            }
            (Estimator::DecisionTree { criterion, .. }, "criterion") => {
                *criterion = value.as_str().ok_or_else(invalid)?.parse()?;
            }
            (Estimator::GradientBoosting(p), "learning_rate") => {
                p.learning_rate = value.as_f64().ok_or_else(invalid)?;
            }
            (Estimator::GradientBoosting(p), "subsample") => {
                p.subsample = value.as_f64().ok_or_else(invalid)?;
            }
            (Estimator::GradientBoosting(p), "n_estimators") => {
                p.n_estimators = value.as_u64().ok_or_else(invalid)? as usize;
            }
            (Estimator::GradientBoosting(p), "max_depth") => {
                p.max_depth = value
                    .as_u64()
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or_else(invalid)?;
            }
            (Estimator::LogisticRegression { alpha }, "alpha") => {
                *alpha = value
                    .as_f64()
                    .filter(|v| *v >= 0.0)
                    .ok_or_else(invalid)?;
            }
            (Estimator::AdaBoost(p), "learning_rate") => {
                p.learning_rate = value.as_f64().ok_or_else(invalid)?;
            }
            (Estimator::AdaBoost(p), "n_estimators") => {
                p.n_estimators = value.as_u64().ok_or_else(invalid)? as usize;
            }
            _ => {
                return Err(NetGuardError::Validation(format!(
                    "unknown parameter '{key}' for {name}"
                )))
            }
        }
        Ok(())
    }

    /// Copy of this estimator with every parameter in `params` applied.
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut estimator = self.clone();
        for (key, value) in params {
            estimator.set_param(key, value)?;
        }
        Ok(estimator)
    }

    pub fn fit(&self, x: ArrayView2<f64>, y: &[i32]) -> Result<Classifier> {
        if x.nrows() != y.len() {
            return Err(NetGuardError::Validation(format!(
                "feature rows {} != label count {}",
                x.nrows(),
                y.len()
            )));
        }

        let model = match self {
            Estimator::RandomForest {
                n_estimators,
                max_depth,
                seed,
            } => {
                let mut params = RandomForestClassifierParameters::default()
                    .with_n_trees(*n_estimators)
                    .with_seed(*seed);
                if let Some(depth) = max_depth {
                    params = params.with_max_depth(*depth);
                }
                Classifier::RandomForest(Forest::fit(&to_dense(x)?, &y.to_vec(), params)?)
            }
            Estimator::DecisionTree {
                criterion,
                max_depth,
            } => {
                let mut params =
                    DecisionTreeClassifierParameters::default().with_criterion((*criterion).into());
                if let Some(depth) = max_depth {
                    params = params.with_max_depth(*depth);
                }
                Classifier::DecisionTree(Tree::fit(&to_dense(x)?, &y.to_vec(), params)?)
            }
            Estimator::GradientBoosting(params) => {
                Classifier::GradientBoosting(GradientBoostingClassifier::fit(x, y, params)?)
            }
            Estimator::LogisticRegression { alpha } => {
                let params = LogisticRegressionParameters::default().with_alpha(*alpha);
                Classifier::LogisticRegression(Logistic::fit(&to_dense(x)?, &y.to_vec(), params)?)
            }
            Estimator::AdaBoost(params) => {
                Classifier::AdaBoost(AdaBoostClassifier::fit(x, y, params)?)
            }
        };
        Ok(model)
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn set_param_updates_hyperparameters() {
        let mut gb = Estimator::gradient_boosting();
        gb.set_param("learning_rate", &ParamValue::Float(0.05)).unwrap();
        gb.set_param("subsample", &ParamValue::Float(0.75)).unwrap();
        gb.set_param("n_estimators", &ParamValue::Int(32)).unwrap();

        match gb {
            Estimator::GradientBoosting(p) => {
                assert_eq!(p.learning_rate, 0.05);
                assert_eq!(p.subsample, 0.75);
                assert_eq!(p.n_estimators, 32);
            }
            other => panic!("unexpected estimator {other:?}"),
        }
    }

    #[test]
    fn log_loss_maps_to_entropy() {
        let mut dt = Estimator::decision_tree();
        dt.set_param("criterion", &ParamValue::from("log_loss")).unwrap();
        assert_eq!(
            dt,
            Estimator::DecisionTree {
                criterion: Criterion::Entropy,
                max_depth: None
            }
        );
    }

    #[test]
    fn unknown_or_mistyped_params_are_rejected() {
        let mut lr = Estimator::logistic_regression();
        assert!(lr.set_param("n_estimators", &ParamValue::Int(8)).is_err());

        let mut rf = Estimator::random_forest();
        assert!(rf.set_param("n_estimators", &ParamValue::from("many")).is_err());
        assert!(rf.set_param("n_estimators", &ParamValue::Int(0)).is_err());
    }

    #[test]
    fn with_seed_only_touches_stochastic_models() {
        let rf = Estimator::random_forest().with_seed(7);
        assert!(matches!(rf, Estimator::RandomForest { seed: 7, .. }));

        let dt = Estimator::decision_tree();
        assert_eq!(dt.clone().with_seed(7), dt);
    }

    #[test]
    fn decision_tree_fits_and_predicts() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64);
        let y: Vec<i32> = (0..20).map(|i| i32::from(i >= 10)).collect();

        let model = Estimator::decision_tree().fit(x.view(), &y).unwrap();
        assert_eq!(model.kind(), "decision_tree");
        assert_eq!(model.predict(x.view()).unwrap(), y);
    }

    #[test]
    fn fit_rejects_mismatched_lengths() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = vec![0, 1];
        assert!(matches!(
            Estimator::decision_tree().fit(x.view(), &y),
            Err(NetGuardError::Validation(_))
        ));
    }
}
