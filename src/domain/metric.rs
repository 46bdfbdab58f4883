use serde::{Deserialize, Serialize};

/// Binary classification scores for one prediction set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

impl ClassificationMetric {
    /// Metric name/value pairs in the order they are sent to the tracker.
    pub fn as_pairs(&self) -> [(&'static str, f64); 3] {
        [
            ("f1_score", self.f1_score),
            ("recall_score", self.recall_score),
            ("precision_score", self.precision_score),
        ]
    }
}

impl std::fmt::Display for ClassificationMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "f1={:.4} precision={:.4} recall={:.4}",
            self.f1_score, self.precision_score, self.recall_score
        )
    }
}
