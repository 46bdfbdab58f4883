//! Feature preprocessing saved by the data transformation stage.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{NetGuardError, Result};

pub const DEFAULT_NEIGHBORS: usize = 3;

/// Transform applied to raw features before inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preprocessor {
    Identity,
    KnnImputer(KnnImputer),
}

impl Preprocessor {
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        match self {
            Preprocessor::Identity => Ok(x.to_owned()),
            Preprocessor::KnnImputer(imputer) => imputer.transform(x),
        }
    }
}

/// Fills missing (NaN) values with the mean of the nearest fitted rows.
///
/// Distances use the NaN-aware euclidean metric: only coordinates present in
/// both rows count, scaled up by the fraction of coordinates present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnImputer {
    n_neighbors: usize,
    /// Fitted rows; `None` marks a missing value
    donors: Vec<Vec<Option<f64>>>,
    /// Fallback per column when no donor has a value
    column_means: Vec<Option<f64>>,
}

fn to_options(row: ArrayView1<f64>) -> Vec<Option<f64>> {
    row.iter()
        .map(|v| if v.is_nan() { None } else { Some(*v) })
        .collect()
}

impl KnnImputer {
    pub fn fit(x: ArrayView2<f64>, n_neighbors: usize) -> Result<Self> {
        if n_neighbors == 0 {
            return Err(NetGuardError::Validation("n_neighbors must be > 0".to_string()));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(NetGuardError::Validation(
                "cannot fit imputer on an empty matrix".to_string(),
            ));
        }

        let donors: Vec<Vec<Option<f64>>> = x.outer_iter().map(to_options).collect();
        let column_means = x
            .columns()
            .into_iter()
            .map(|col| {
                let present: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum::<f64>() / present.len() as f64)
                }
            })
            .collect();

        Ok(Self {
            n_neighbors,
            donors,
            column_means,
        })
    }

    pub fn n_features(&self) -> usize {
        self.column_means.len()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(NetGuardError::Validation(format!(
                "imputer fitted on {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }

        let mut out = x.to_owned();
        for (r, row) in x.outer_iter().enumerate() {
            let row = to_options(row);
            if row.iter().all(Option::is_some) {
                continue;
            }

            let distances: Vec<Option<f64>> = self
                .donors
                .iter()
                .map(|donor| nan_euclidean(&row, donor))
                .collect();

            for (c, value) in row.iter().enumerate() {
                if value.is_some() {
                    continue;
                }
                out[[r, c]] = self.impute(c, &distances);
            }
        }
        Ok(out)
    }

    fn impute(&self, column: usize, distances: &[Option<f64>]) -> f64 {
        let mut candidates: Vec<(f64, f64)> = self
            .donors
            .iter()
            .zip(distances)
            .filter_map(|(donor, d)| Some(((*d)?, donor[column]?)))
            .collect();

        if candidates.is_empty() {
            return self.column_means[column].unwrap_or(0.0);
        }

        // stable: equal distances keep fitted row order
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        let k = self.n_neighbors.min(candidates.len());
        candidates[..k].iter().map(|(_, v)| v).sum::<f64>() / k as f64
    }
}

fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let mut present = 0usize;
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            present += 1;
            sum += (x - y).powi(2);
        }
    }
    if present == 0 {
        return None;
    }
    Some((a.len() as f64 / present as f64 * sum).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn imputes_from_nearest_neighbours() {
        let fit = array![
            [1.0, 10.0],
            [2.0, 20.0],
            [3.0, 30.0],
            [100.0, 1000.0],
        ];
        let imputer = KnnImputer::fit(fit.view(), 3).unwrap();

        let x = array![[2.0, f64::NAN], [5.0, 50.0]];
        let out = imputer.transform(x.view()).unwrap();

        // neighbours of x0=2.0 are rows 1, 0, 2
        assert!((out[[0, 1]] - 20.0).abs() < 1e-12);
        assert_eq!(out[[1, 1]], 50.0);
    }

    #[test]
    fn falls_back_to_column_mean_without_overlap() {
        let fit = array![[f64::NAN, 4.0], [f64::NAN, 8.0]];
        let imputer = KnnImputer::fit(fit.view(), 2).unwrap();

        // row shares no present coordinate with any donor
        let x = array![[1.0, f64::NAN]];
        let out = imputer.transform(x.view()).unwrap();
        assert_eq!(out[[0, 1]], 6.0);
    }

    #[test]
    fn rejects_feature_count_mismatch() {
        let imputer = KnnImputer::fit(array![[1.0, 2.0]].view(), 1).unwrap();
        let err = imputer.transform(array![[1.0, 2.0, 3.0]].view());
        assert!(matches!(err, Err(NetGuardError::Validation(_))));
    }

    #[test]
    fn nan_euclidean_scales_by_present_fraction() {
        let a = [Some(0.0), None];
        let b = [Some(3.0), Some(1.0)];
        // sqrt(2/1 * 9)
        assert!((nan_euclidean(&a, &b).unwrap() - 18f64.sqrt()).abs() < 1e-12);
        assert_eq!(nan_euclidean(&[None], &[Some(1.0)]), None);
    }

    #[test]
    fn serializes_without_nan_literals() {
        let fit = array![[1.0, f64::NAN], [3.0, 4.0]];
        let pre = Preprocessor::KnnImputer(KnnImputer::fit(fit.view(), 3).unwrap());

        let json = serde_json::to_string(&pre).unwrap();
        let back: Preprocessor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pre);
    }
}
