//! Classification scores.
//!
//! Binary precision/recall/F1 treat label `1` as the positive class; a
//! zero denominator yields `0.0`.

use crate::domain::ClassificationMetric;
use crate::error::{NetGuardError, Result};

pub const POSITIVE_LABEL: i32 = 1;

fn check_lengths(y_true: &[i32], y_pred: &[i32]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(NetGuardError::Validation(format!(
            "y_true has {} labels but y_pred has {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(NetGuardError::Validation(
            "cannot score an empty prediction set".to_string(),
        ));
    }
    Ok(())
}

/// Confusion counts for one positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryConfusion {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl BinaryConfusion {
    pub fn from_predictions(y_true: &[i32], y_pred: &[i32], positive: i32) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == positive, p == positive) {
                (true, true) => cm.true_positives += 1,
                (false, true) => cm.false_positives += 1,
                (true, false) => cm.false_negatives += 1,
                (false, false) => cm.true_negatives += 1,
            }
        }
        Ok(cm)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positives,
            2 * self.true_positives + self.false_positives + self.false_negatives,
        )
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// F1, precision and recall of one prediction set.
pub fn get_classification_score(y_true: &[i32], y_pred: &[i32]) -> Result<ClassificationMetric> {
    let cm = BinaryConfusion::from_predictions(y_true, y_pred, POSITIVE_LABEL)?;
    Ok(ClassificationMetric {
        f1_score: cm.f1(),
        precision_score: cm.precision(),
        recall_score: cm.recall(),
    })
}

pub fn accuracy(y_true: &[i32], y_pred: &[i32]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Coefficient of determination over the label values.
pub fn r2_score(y_true: &[i32], y_pred: &[i32]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len() as f64;
    let mean = y_true.iter().map(|&v| v as f64).sum::<f64>() / n;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(&t, &p)| (t as f64 - p as f64).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|&t| (t as f64 - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}
