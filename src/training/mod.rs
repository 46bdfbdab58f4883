//! Training pipeline stages.

mod trainer;

pub use trainer::ModelTrainer;
