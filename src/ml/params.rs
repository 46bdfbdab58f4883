//! Hyperparameter values and search grids.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Int(v) => u64::try_from(*v).ok(),
            ParamValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// One concrete assignment of hyperparameters
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Render a parameter set as `key=value, key=value`.
pub fn describe(params: &ParamSet) -> String {
    if params.is_empty() {
        return "defaults".to_string();
    }
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Candidate values per hyperparameter.
///
/// Keys iterate in sorted order; the cartesian product varies the last key fastest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid(BTreeMap<String, Vec<ParamValue>>);

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V, I>(mut self, key: &str, values: I) -> Self
    where
        V: Into<ParamValue>,
        I: IntoIterator<Item = V>,
    {
        self.0
            .insert(key.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of combinations the grid expands to.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    /// Expand the grid; an empty grid yields one empty set (estimator defaults).
    pub fn combinations(&self) -> Vec<ParamSet> {
        let mut combos = vec![ParamSet::new()];
        for (key, values) in &self.0 {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut extended = combo.clone();
                    extended.insert(key.clone(), value.clone());
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_grid_yields_defaults_once() {
        let grid = ParamGrid::new();
        let combos = grid.combinations();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn product_varies_last_key_fastest() {
        let grid = ParamGrid::new()
            .with("n_estimators", [8_i64, 16])
            .with("learning_rate", [0.1, 0.01]);
        let combos = grid.combinations();

        assert_eq!(grid.len(), 4);
        assert_eq!(combos.len(), 4);
        // keys sort as learning_rate < n_estimators
        assert_eq!(combos[0]["learning_rate"], ParamValue::Float(0.1));
        assert_eq!(combos[0]["n_estimators"], ParamValue::Int(8));
        assert_eq!(combos[1]["n_estimators"], ParamValue::Int(16));
        assert_eq!(combos[2]["learning_rate"], ParamValue::Float(0.01));
    }

    #[test]
    fn key_without_values_expands_to_nothing() {
        let grid = ParamGrid::new().with("criterion", Vec::<&str>::new());
        assert!(grid.combinations().is_empty());
    }

    #[test]
    fn value_conversions() {
        assert_eq!(ParamValue::Int(32).as_u64(), Some(32));
        assert_eq!(ParamValue::Int(-1).as_u64(), None);
        assert_eq!(ParamValue::Float(0.5).as_u64(), None);
        assert_eq!(ParamValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(ParamValue::from("gini").as_str(), Some("gini"));
    }

    #[test]
    fn describe_lists_sorted_pairs() {
        let grid = ParamGrid::new()
            .with("subsample", [0.6])
            .with("learning_rate", [0.1]);
        let combo = &grid.combinations()[0];
        assert_eq!(describe(combo), "learning_rate=0.1, subsample=0.6");
        assert_eq!(describe(&ParamSet::new()), "defaults");
    }
}
