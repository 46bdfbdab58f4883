//! Fitted classifiers.

use std::fmt;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::RandomForestClassifier;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::LogisticRegression;
use smartcore::tree::decision_tree_classifier::DecisionTreeClassifier;

use super::boosting::{AdaBoostClassifier, GradientBoostingClassifier};
use crate::error::{NetGuardError, Result};

pub(crate) type Forest = RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;
pub(crate) type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;
pub(crate) type Logistic = LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Copy an ndarray view into smartcore's row-major dense matrix.
pub(crate) fn to_dense(x: ArrayView2<f64>) -> Result<DenseMatrix<f64>> {
    let (rows, cols) = x.dim();
    if rows == 0 || cols == 0 {
        return Err(NetGuardError::Validation(format!(
            "feature matrix must be non-empty, got {rows}x{cols}"
        )));
    }
    let values: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();
    Ok(DenseMatrix::from_2d_vec(&values))
}

/// A trained model ready for inference
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum Classifier {
    RandomForest(Forest),
    DecisionTree(Tree),
    GradientBoosting(GradientBoostingClassifier),
    LogisticRegression(Logistic),
    AdaBoost(AdaBoostClassifier),
}

impl Classifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::RandomForest(_) => "random_forest",
            Classifier::DecisionTree(_) => "decision_tree",
            Classifier::GradientBoosting(_) => "gradient_boosting",
            Classifier::LogisticRegression(_) => "logistic_regression",
            Classifier::AdaBoost(_) => "ada_boost",
        }
    }

    /// Predict one class label per row.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<i32>> {
        match self {
            Classifier::GradientBoosting(model) => model.predict(x),
            Classifier::AdaBoost(model) => model.predict(x),
            Classifier::RandomForest(model) => Ok(model.predict(&to_dense(x)?)?),
            Classifier::DecisionTree(model) => Ok(model.predict(&to_dense(x)?)?),
            Classifier::LogisticRegression(model) => Ok(model.predict(&to_dense(x)?)?),
        }
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}
