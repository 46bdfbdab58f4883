//! Model training building blocks.
//!
//! Estimator implementations come from `smartcore`; boosting ensembles,
//! grid search, scoring and preprocessing live here.

pub mod boosting;
pub mod bundle;
pub mod catalog;
pub mod classifier;
pub mod estimator;
pub mod metrics;
pub mod params;
pub mod preprocess;
pub mod search;

pub use bundle::ModelBundle;
pub use catalog::{CatalogEntry, ModelCatalog};
pub use classifier::Classifier;
pub use estimator::{Criterion, Estimator};
pub use metrics::get_classification_score;
pub use params::{ParamGrid, ParamSet, ParamValue};
pub use preprocess::{KnnImputer, Preprocessor};
pub use search::{evaluate_models, EvaluatedModel, ModelReport, SearchOptions, SelectionMetric};
