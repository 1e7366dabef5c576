use chrono::{DateTime, Duration, Utc};

/// `earned / total * 100`; a non-positive total yields 0.
pub fn percentage(earned: f64, total: f64) -> f64 {
    if total <= 0.0 || !total.is_finite() || !earned.is_finite() {
        return 0.0;
    }
    earned / total * 100.0
}

pub fn passed(percentage: f64, passing_threshold: f64) -> bool {
    percentage >= passing_threshold
}

/// `min(days * per_day, cap)`, never negative.
pub fn late_penalty(days_late: u32, per_day_percent: f64, cap: f64) -> f64 {
    let raw = f64::from(days_late) * per_day_percent.max(0.0);
    raw.min(cap.max(0.0)).max(0.0)
}

/// Raw score reduced by the penalty percentage (clamped to 0..=100).
pub fn final_score(raw_score: f64, late_penalty_percent: f64) -> f64 {
    let penalty = late_penalty_percent.clamp(0.0, 100.0);
    raw_score - raw_score * penalty / 100.0
}

/// Started days past the due date; zero when on time.
pub fn days_late(due: DateTime<Utc>, submitted: DateTime<Utc>) -> u32 {
    let overdue = submitted - due;
    if overdue <= Duration::zero() {
        return 0;
    }
    let whole = overdue.num_days();
    let partial = i64::from(overdue > Duration::days(whole));
    let days = whole + partial;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Arithmetic mean; an empty input averages to 0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn weighted_final_score(
    average_quiz: f64,
    average_assignment: f64,
    quiz_weight: f64,
    assignment_weight: f64,
) -> f64 {
    average_quiz * quiz_weight + average_assignment * assignment_weight
}
