use serde::{Deserialize, Serialize};

/// One row of the letter-grade table: scores at or above `min_percent` earn `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub min_percent: f64,
    pub label: String,
}

impl GradeBand {
    pub fn new(min_percent: f64, label: impl Into<String>) -> Self {
        Self {
            min_percent,
            label: label.into(),
        }
    }
}

/// Tunables shared by every scoring call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub grade_bands: Vec<GradeBand>,
    /// Label for scores below every band.
    pub fallback_grade: String,
    pub quiz_weight: f64,
    pub assignment_weight: f64,
    pub late_penalty_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            grade_bands: vec![
                GradeBand::new(95.0, "A+"),
                GradeBand::new(90.0, "A"),
                GradeBand::new(85.0, "B+"),
                GradeBand::new(80.0, "B"),
                GradeBand::new(75.0, "C+"),
                GradeBand::new(70.0, "C"),
            ],
            fallback_grade: "Pass".to_string(),
            quiz_weight: 0.4,
            assignment_weight: 0.6,
            late_penalty_cap: 100.0,
        }
    }
}
