//! Transformed dataset loading.
//!
//! The data transformation stage writes train/test matrices as `.npy` files
//! with the target label in the last column.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{s, Array2, ArrayView1};
use ndarray_npy::ReadNpyExt;

use crate::error::{NetGuardError, Result};

/// Load a 2-D `f64` array from an `.npy` file.
pub fn load_numpy_array_data<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| NetGuardError::file(path, e))?;
    let array = Array2::<f64>::read_npy(BufReader::new(file))?;
    Ok(array)
}

/// Split a matrix into features (all but the last column) and labels (last column).
pub fn split_features_labels(array: &Array2<f64>) -> Result<(Array2<f64>, Vec<i32>)> {
    let (rows, cols) = array.dim();
    if rows == 0 {
        return Err(NetGuardError::Validation("array has no rows".to_string()));
    }
    if cols < 2 {
        return Err(NetGuardError::Validation(format!(
            "array needs at least one feature column and a label column, got {cols} column(s)"
        )));
    }

    let features = array.slice(s![.., ..cols - 1]).to_owned();
    let labels = labels_from_column(array.column(cols - 1))?;
    Ok((features, labels))
}

/// Convert a float label column into integer class labels.
pub fn labels_from_column(column: ArrayView1<f64>) -> Result<Vec<i32>> {
    column
        .iter()
        .enumerate()
        .map(|(row, &v)| {
            if !v.is_finite() || v.fract() != 0.0 || v.abs() > i32::MAX as f64 {
                Err(NetGuardError::Validation(format!(
                    "label at row {row} is not an integer class: {v}"
                )))
            } else {
                Ok(v as i32)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::write_npy;

    #[test]
    fn split_takes_last_column_as_label() {
        let arr = array![[0.5, 1.0, 0.0], [1.5, -2.0, 1.0], [2.5, 3.0, 1.0]];
        let (x, y) = split_features_labels(&arr).unwrap();

        assert_eq!(x.dim(), (3, 2));
        assert_eq!(x[[1, 1]], -2.0);
        assert_eq!(y, vec![0, 1, 1]);
    }

    #[test]
    fn rejects_fractional_or_missing_labels() {
        let arr = array![[0.5, 0.5]];
        assert!(matches!(
            split_features_labels(&arr),
            Err(NetGuardError::Validation(_))
        ));

        let arr = array![[0.5, f64::NAN]];
        assert!(split_features_labels(&arr).is_err());
    }

    #[test]
    fn rejects_label_only_matrix() {
        let arr = array![[1.0], [0.0]];
        assert!(split_features_labels(&arr).is_err());
    }

    #[test]
    fn loads_npy_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.npy");
        let arr = array![[1.0, 2.0, 1.0], [3.0, 4.0, 0.0]];
        write_npy(&path, &arr).unwrap();

        let loaded = load_numpy_array_data(&path).unwrap();
        assert_eq!(loaded, arr);
    }

    #[test]
    fn one_dimensional_npy_is_an_array_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.npy");
        write_npy(&path, &array![1.0, 0.0, 1.0]).unwrap();

        let err = load_numpy_array_data(&path).unwrap_err();
        assert!(matches!(err, NetGuardError::Npy(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_numpy_array_data("does/not/exist.npy").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.npy"));
    }
}
