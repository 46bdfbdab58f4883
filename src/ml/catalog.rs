//! The fixed set of classifier candidates and their search grids.

use super::estimator::Estimator;
use super::params::ParamGrid;

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub estimator: Estimator,
    pub grid: ParamGrid,
}

/// Ordered model candidates; order decides ties during selection
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard candidates: forests, trees, boosting and a linear baseline.
    pub fn standard() -> Self {
        Self::new()
            .with(
                "Random Forest",
                Estimator::random_forest(),
                ParamGrid::new().with("n_estimators", [8_i64, 16, 32, 128, 256]),
            )
            .with(
                "Decision Tree",
                Estimator::decision_tree(),
                ParamGrid::new().with("criterion", ["gini", "entropy", "log_loss"]),
            )
            .with(
                "Gradient Boosting",
                Estimator::gradient_boosting(),
                ParamGrid::new()
                    .with("learning_rate", [0.1, 0.01, 0.05, 0.001])
                    .with("subsample", [0.6, 0.7, 0.75, 0.85, 0.9])
                    .with("n_estimators", [8_i64, 16, 32, 64, 128, 256]),
            )
            .with(
                "Logistic Regression",
                Estimator::logistic_regression(),
                ParamGrid::new(),
            )
            .with(
                "AdaBoost",
                Estimator::ada_boost(),
                ParamGrid::new()
                    .with("learning_rate", [0.1, 0.01, 0.001])
                    .with("n_estimators", [8_i64, 16, 32, 64, 128, 256]),
            )
    }

    pub fn with(mut self, name: &str, estimator: Estimator, grid: ParamGrid) -> Self {
        self.entries.push(CatalogEntry {
            name: name.to_string(),
            estimator,
            grid,
        });
        self
    }

    /// Apply one seed to every stochastic estimator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        for entry in &mut self.entries {
            entry.estimator = entry.estimator.clone().with_seed(seed);
        }
        self
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
