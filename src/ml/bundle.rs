//! Preprocessor and model persisted as one unit.

use std::path::Path;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::classifier::Classifier;
use super::preprocess::Preprocessor;
use crate::error::Result;
use crate::persistence::{load_object, save_object};

/// Inference entry point: raw features in, class labels out
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    preprocessor: Preprocessor,
    model: Classifier,
}

impl ModelBundle {
    pub fn new(preprocessor: Preprocessor, model: Classifier) -> Self {
        Self {
            preprocessor,
            model,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_object(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_object(path, self)
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn model(&self) -> &Classifier {
        &self.model
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<i32>> {
        let transformed = self.preprocessor.transform(x)?;
        self.model.predict(transformed.view())
    }
}
