//! Pure scoring functions. Nothing here touches storage or the clock, and
//! nothing panics on well-typed numeric input.

mod config;
mod rules;

pub use config::{GradeBand, ScoringConfig};
pub use rules::{
    days_late, final_score, late_penalty, mean, passed, percentage, weighted_final_score,
};

/// Stateless scorer bound to a configuration table.
#[derive(Debug, Clone)]
pub struct ScoringRules {
    config: ScoringConfig,
}

impl ScoringRules {
    pub fn new(mut config: ScoringConfig) -> Self {
        config
            .grade_bands
            .sort_by(|a, b| b.min_percent.total_cmp(&a.min_percent));
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn letter_grade(&self, final_score_percent: f64) -> &str {
        self.config
            .grade_bands
            .iter()
            .find(|band| final_score_percent >= band.min_percent)
            .map(|band| band.label.as_str())
            .unwrap_or(self.config.fallback_grade.as_str())
    }

    pub fn late_penalty(&self, days_late: u32, per_day_percent: f64) -> f64 {
        late_penalty(days_late, per_day_percent, self.config.late_penalty_cap)
    }

    pub fn final_course_score(&self, average_quiz: f64, average_assignment: f64) -> f64 {
        weighted_final_score(
            average_quiz,
            average_assignment,
            self.config.quiz_weight,
            self.config.assignment_weight,
        )
    }
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
