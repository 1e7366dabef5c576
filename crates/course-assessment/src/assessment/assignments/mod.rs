//! Assignment submission intake and the one-time grading transition.

mod autograde;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::domain::{
    Assignment, AssignmentId, AssignmentSubmission, RubricScore, SubmissionContent, SubmissionId,
    SubmissionStatus, TestCaseResult, UserId,
};
use super::error::AssessmentError;
use super::guard::{require_enrollment, retry_on_contention};
use super::notifications::{dispatch, Notification, NotificationEvent, Notifier};
use super::quiz::remaining_attempts;
use super::repository::AssessmentStore;
use super::scoring::{self, ScoringRules};
use crate::auth::Principal;
use crate::clock::Clock;

pub use autograde::{AutoGradeError, AutoGrader, ManualReviewGrader};

/// Grader-supplied verdict. Either a raw score, a rubric breakdown, or
/// both when they agree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeInput {
    #[serde(default)]
    pub raw_score: Option<f64>,
    #[serde(default)]
    pub rubric_scores: Vec<RubricScore>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionHistory {
    pub assignment_id: AssignmentId,
    pub max_attempts: u32,
    pub used: u32,
    pub remaining: Option<u32>,
    pub submissions: Vec<AssignmentSubmission>,
}

struct Verdict {
    raw_score: f64,
    rubric_scores: Vec<RubricScore>,
    feedback: Option<String>,
    graded_by: Option<UserId>,
    test_results: Vec<TestCaseResult>,
}

fn next_submission_id() -> SubmissionId {
    SubmissionId(format!("sub-{}", Uuid::new_v4().simple()))
}

const SCORE_TOLERANCE: f64 = 1e-6;

/// Validates the grader's input and resolves the raw score it implies.
pub(crate) fn resolve_raw_score(
    assignment: &Assignment,
    input: &GradeInput,
) -> Result<f64, AssessmentError> {
    let total = assignment.effective_total_points();

    let rubric_total = if input.rubric_scores.is_empty() {
        None
    } else {
        if assignment.rubric.is_empty() {
            return Err(AssessmentError::ValidationError(format!(
                "assignment '{}' has no rubric",
                assignment.id
            )));
        }
        let mut seen = BTreeSet::new();
        for score in &input.rubric_scores {
            let criterion = assignment.criterion(&score.criterion).ok_or_else(|| {
                AssessmentError::ValidationError(format!(
                    "unknown rubric criterion '{}'",
                    score.criterion
                ))
            })?;
            if !seen.insert(score.criterion.as_str()) {
                return Err(AssessmentError::ValidationError(format!(
                    "rubric criterion '{}' scored twice",
                    score.criterion
                )));
            }
            let in_range = score.points.is_finite()
                && score.points >= 0.0
                && score.points <= criterion.max_points;
            if !in_range {
                return Err(AssessmentError::ValidationError(format!(
                    "criterion '{}' accepts 0 to {} points, got {}",
                    score.criterion, criterion.max_points, score.points
                )));
            }
        }
        Some(input.rubric_scores.iter().map(|score| score.points).sum::<f64>())
    };

    let raw = match (input.raw_score, rubric_total) {
        (Some(raw), Some(rubric)) if (raw - rubric).abs() > SCORE_TOLERANCE => {
            return Err(AssessmentError::ValidationError(format!(
                "raw score {raw} does not match rubric total {rubric}"
            )));
        }
        (_, Some(rubric)) => rubric,
        (Some(raw), None) => raw,
        (None, None) => {
            return Err(AssessmentError::ValidationError(
                "a raw score or rubric scores are required".to_string(),
            ));
        }
    };

    if !raw.is_finite() || raw < 0.0 || raw > total + SCORE_TOLERANCE {
        return Err(AssessmentError::ValidationError(format!(
            "raw score must be between 0 and {total}, got {raw}"
        )));
    }
    Ok(raw)
}

/// Late-penalised final score and the pass verdict against the
/// assignment's effective total.
pub(crate) fn grade_outcome(
    assignment: &Assignment,
    raw_score: f64,
    late_penalty: f64,
) -> (f64, bool) {
    let final_score = scoring::final_score(raw_score, late_penalty);
    let percentage = scoring::percentage(final_score, assignment.effective_total_points());
    (final_score, scoring::passed(percentage, assignment.passing_score))
}

/// Intake with attempt and deadline enforcement, then grading.
pub struct AssignmentGradingPipeline<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    rules: Arc<ScoringRules>,
    auto_grader: Arc<dyn AutoGrader>,
    write_retries: u32,
}

impl<S, N> AssignmentGradingPipeline<S, N>
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        rules: Arc<ScoringRules>,
        auto_grader: Arc<dyn AutoGrader>,
        write_retries: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            rules,
            auto_grader,
            write_retries,
        }
    }

    fn assignment(&self, assignment_id: &AssignmentId) -> Result<Assignment, AssessmentError> {
        self.store
            .assignment(assignment_id)?
            .ok_or_else(|| AssessmentError::not_found("assignment", assignment_id))
    }

    fn submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        self.store
            .fetch_submission(submission_id)?
            .ok_or_else(|| AssessmentError::not_found("submission", submission_id))
    }

    fn require_grader(principal: &Principal) -> Result<(), AssessmentError> {
        if principal.can_grade() {
            Ok(())
        } else {
            Err(AssessmentError::Forbidden(
                "grading requires the grader or admin role".to_string(),
            ))
        }
    }

    pub fn submit(
        &self,
        principal: &Principal,
        assignment_id: &AssignmentId,
        content: SubmissionContent,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        let assignment = self.assignment(assignment_id)?;
        let learner_id = &principal.user_id;
        require_enrollment(self.store.as_ref(), learner_id, &assignment.course_id)?;
        if content.is_empty() {
            return Err(AssessmentError::ValidationError(
                "submission has no text, code or files".to_string(),
            ));
        }

        let now = self.clock.now();
        let is_late = assignment.due_date.is_some_and(|due| now > due);
        let (days_late, late_penalty) = self.lateness(&assignment, now)?;

        let submission = retry_on_contention(self.write_retries, "submit_assignment", || {
            let previous = self.store.submissions_for(learner_id, assignment_id)?;
            let used = u32::try_from(previous.len()).unwrap_or(u32::MAX);
            if assignment.max_attempts > 0 && used >= assignment.max_attempts {
                return Err(AssessmentError::AttemptLimitExceeded {
                    max_attempts: assignment.max_attempts,
                    used,
                });
            }

            let submission = AssignmentSubmission {
                id: next_submission_id(),
                learner_id: learner_id.clone(),
                assignment_id: assignment.id.clone(),
                course_id: assignment.course_id.clone(),
                attempt_number: used + 1,
                content: content.clone(),
                submitted_at: now,
                is_late,
                days_late,
                late_penalty,
                status: if assignment.is_auto_gradable() {
                    SubmissionStatus::Grading
                } else {
                    SubmissionStatus::Submitted
                },
                raw_score: None,
                rubric_scores: Vec::new(),
                final_score: None,
                passed: None,
                graded_by: None,
                graded_at: None,
                feedback: None,
                test_results: Vec::new(),
                version: 0,
            };
            Ok(self.store.insert_submission(submission)?)
        })?;

        info!(
            learner = %learner_id,
            assignment = %assignment_id,
            submission = %submission.id,
            attempt_number = submission.attempt_number,
            is_late = submission.is_late,
            late_penalty = submission.late_penalty,
            "assignment submission received"
        );

        if assignment.is_auto_gradable() {
            return self.auto_grade(submission, &assignment);
        }
        Ok(submission)
    }

    /// `(days_late, penalty_percent)`, or `DeadlinePassed` when late work is closed.
    fn lateness(
        &self,
        assignment: &Assignment,
        now: DateTime<Utc>,
    ) -> Result<(u32, f64), AssessmentError> {
        let Some(due_date) = assignment.due_date else {
            return Ok((0, 0.0));
        };
        if now <= due_date {
            return Ok((0, 0.0));
        }
        if !assignment.late_policy.allow_late {
            return Err(AssessmentError::DeadlinePassed { due_date });
        }
        let days = scoring::days_late(due_date, now);
        Ok((
            days,
            self.rules
                .late_penalty(days, assignment.late_policy.penalty_per_day),
        ))
    }

    fn auto_grade(
        &self,
        submission: AssignmentSubmission,
        assignment: &Assignment,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        let results = match self
            .auto_grader
            .run_test_cases(&submission, &assignment.test_cases)
        {
            Ok(Some(results)) => results,
            Ok(None) => {
                debug!(submission = %submission.id, "auto-grader deferred to manual review");
                return Ok(submission);
            }
            Err(err) => {
                warn!(
                    submission = %submission.id,
                    error = %err,
                    "auto-grading failed; awaiting manual review"
                );
                return Ok(submission);
            }
        };

        let total = assignment.effective_total_points();
        let raw_score = results
            .iter()
            .map(|result| result.points_awarded.max(0.0))
            .sum::<f64>()
            .min(total);

        let graded = retry_on_contention(self.write_retries, "auto_grade", || {
            let current = self.submission(&submission.id)?;
            if !current.status.awaiting_grade() {
                return Ok(None);
            }
            let verdict = Verdict {
                raw_score,
                rubric_scores: Vec::new(),
                feedback: None,
                graded_by: None,
                test_results: results.clone(),
            };
            Ok(Some(self.write_grade(current, assignment, verdict)?))
        })?;

        match graded {
            Some(graded) => {
                self.announce_grade(&graded, assignment);
                Ok(graded)
            }
            None => self.submission(&submission.id),
        }
    }

    /// One-time terminal transition. Concurrent calls serialize on the
    /// submission's version: the first wins and the rest see `AlreadyGraded`.
    pub fn grade(
        &self,
        principal: &Principal,
        submission_id: &SubmissionId,
        input: GradeInput,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        Self::require_grader(principal)?;

        let (graded, assignment) = retry_on_contention(self.write_retries, "grade_submission", || {
            let submission = self.submission(submission_id)?;
            match submission.status {
                SubmissionStatus::Graded => {
                    return Err(AssessmentError::AlreadyGraded {
                        submission_id: submission.id,
                    })
                }
                SubmissionStatus::Returned => {
                    return Err(AssessmentError::ValidationError(format!(
                        "submission '{}' was returned for revision; grade the resubmission",
                        submission.id
                    )))
                }
                SubmissionStatus::Submitted | SubmissionStatus::Grading => {}
            }

            let assignment = self.assignment(&submission.assignment_id)?;
            let verdict = Verdict {
                raw_score: resolve_raw_score(&assignment, &input)?,
                rubric_scores: input.rubric_scores.clone(),
                feedback: input.feedback.clone(),
                graded_by: Some(principal.user_id.clone()),
                test_results: submission.test_results.clone(),
            };
            let graded = self.write_grade(submission, &assignment, verdict)?;
            Ok((graded, assignment))
        })?;

        self.announce_grade(&graded, &assignment);
        Ok(graded)
    }

    fn write_grade(
        &self,
        mut submission: AssignmentSubmission,
        assignment: &Assignment,
        verdict: Verdict,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        let (final_score, passed) =
            grade_outcome(assignment, verdict.raw_score, submission.late_penalty);
        submission.raw_score = Some(verdict.raw_score);
        submission.rubric_scores = verdict.rubric_scores;
        submission.feedback = verdict.feedback;
        submission.test_results = verdict.test_results;
        submission.final_score = Some(final_score);
        submission.passed = Some(passed);
        submission.graded_by = verdict.graded_by;
        submission.graded_at = Some(self.clock.now());
        submission.status = SubmissionStatus::Graded;
        Ok(self.store.update_submission(submission)?)
    }

    fn announce_grade(&self, submission: &AssignmentSubmission, assignment: &Assignment) {
        let final_score = submission.final_score.unwrap_or_default();
        let passed = submission.passed.unwrap_or(false);
        info!(
            learner = %submission.learner_id,
            assignment = %assignment.id,
            submission = %submission.id,
            final_score,
            passed,
            grader = submission.graded_by.as_ref().map(|id| id.as_str()).unwrap_or("auto"),
            "submission graded"
        );
        dispatch(
            self.notifier.as_ref(),
            Notification::new(submission.learner_id.clone(), NotificationEvent::SubmissionGraded)
                .with("assignment_id", &assignment.id)
                .with("assignment_title", &assignment.title)
                .with("final_score", format!("{final_score:.2}"))
                .with("total_points", assignment.effective_total_points())
                .with("passed", passed),
        );
    }

    /// Sends an ungraded submission back to the learner. The learner
    /// corrects it through a new submission attempt.
    pub fn return_for_revision(
        &self,
        principal: &Principal,
        submission_id: &SubmissionId,
        feedback: Option<String>,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        Self::require_grader(principal)?;

        let returned = retry_on_contention(self.write_retries, "return_submission", || {
            let mut submission = self.submission(submission_id)?;
            match submission.status {
                SubmissionStatus::Graded => {
                    return Err(AssessmentError::AlreadyGraded {
                        submission_id: submission.id,
                    })
                }
                SubmissionStatus::Returned => {
                    return Err(AssessmentError::ValidationError(format!(
                        "submission '{}' was already returned",
                        submission.id
                    )))
                }
                SubmissionStatus::Submitted | SubmissionStatus::Grading => {}
            }
            submission.status = SubmissionStatus::Returned;
            submission.feedback = feedback.clone();
            submission.graded_by = Some(principal.user_id.clone());
            submission.graded_at = Some(self.clock.now());
            Ok(self.store.update_submission(submission)?)
        })?;

        info!(
            learner = %returned.learner_id,
            submission = %returned.id,
            grader = %principal.user_id,
            "submission returned for revision"
        );
        let mut notification =
            Notification::new(returned.learner_id.clone(), NotificationEvent::SubmissionReturned)
                .with("assignment_id", &returned.assignment_id)
                .with("submission_id", &returned.id);
        if let Some(feedback) = &returned.feedback {
            notification = notification.with("feedback", feedback);
        }
        dispatch(self.notifier.as_ref(), notification);
        Ok(returned)
    }

    pub fn get_submission(
        &self,
        principal: &Principal,
        submission_id: &SubmissionId,
    ) -> Result<AssignmentSubmission, AssessmentError> {
        let submission = self.submission(submission_id)?;
        if submission.learner_id != principal.user_id && !principal.can_grade() {
            return Err(AssessmentError::Forbidden(format!(
                "submission '{submission_id}' belongs to another learner"
            )));
        }
        Ok(submission)
    }

    pub fn list_submissions(
        &self,
        principal: &Principal,
        assignment_id: &AssignmentId,
    ) -> Result<SubmissionHistory, AssessmentError> {
        let assignment = self.assignment(assignment_id)?;
        let submissions = self
            .store
            .submissions_for(&principal.user_id, assignment_id)?;
        let used = u32::try_from(submissions.len()).unwrap_or(u32::MAX);
        Ok(SubmissionHistory {
            assignment_id: assignment.id,
            max_attempts: assignment.max_attempts,
            used,
            remaining: remaining_attempts(assignment.max_attempts, used),
            submissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::domain::{CourseId, LatePolicy, RubricCriterion};

    fn essay() -> Assignment {
        Assignment {
            id: AssignmentId::new("essay"),
            course_id: CourseId::new("rust-101"),
            title: "Essay".to_string(),
            total_points: 100.0,
            passing_score: 70.0,
            due_date: None,
            late_policy: LatePolicy::default(),
            max_attempts: 0,
            rubric: vec![
                RubricCriterion {
                    criterion: "clarity".to_string(),
                    max_points: 40.0,
                },
                RubricCriterion {
                    criterion: "depth".to_string(),
                    max_points: 60.0,
                },
            ],
            test_cases: Vec::new(),
            auto_grade: false,
        }
    }

    fn rubric(points: &[(&str, f64)]) -> Vec<RubricScore> {
        points
            .iter()
            .map(|(criterion, points)| RubricScore {
                criterion: criterion.to_string(),
                points: *points,
                comment: None,
            })
            .collect()
    }

    #[test]
    fn rubric_scores_sum_into_raw_score() {
        let input = GradeInput {
            raw_score: None,
            rubric_scores: rubric(&[("clarity", 35.0), ("depth", 50.0)]),
            feedback: None,
        };
        assert_eq!(resolve_raw_score(&essay(), &input).unwrap(), 85.0);
    }

    #[test]
    fn rubric_points_are_bounded_per_criterion() {
        let input = GradeInput {
            rubric_scores: rubric(&[("clarity", 41.0)]),
            ..GradeInput::default()
        };
        assert!(matches!(
            resolve_raw_score(&essay(), &input),
            Err(AssessmentError::ValidationError(_))
        ));

        let unknown = GradeInput {
            rubric_scores: rubric(&[("style", 1.0)]),
            ..GradeInput::default()
        };
        assert!(resolve_raw_score(&essay(), &unknown).is_err());
    }

    #[test]
    fn mismatched_raw_and_rubric_totals_are_rejected() {
        let input = GradeInput {
            raw_score: Some(90.0),
            rubric_scores: rubric(&[("clarity", 40.0), ("depth", 40.0)]),
            feedback: None,
        };
        assert!(resolve_raw_score(&essay(), &input).is_err());
    }

    #[test]
    fn raw_score_cannot_exceed_total() {
        let input = GradeInput {
            raw_score: Some(101.0),
            ..GradeInput::default()
        };
        assert!(resolve_raw_score(&essay(), &input).is_err());
        assert!(resolve_raw_score(&essay(), &GradeInput::default()).is_err());
    }

    #[test]
    fn late_penalty_reduces_final_and_verdict() {
        let mut assignment = essay();
        assignment.rubric.clear();
        let (final_score, passed) = grade_outcome(&assignment, 90.0, 30.0);
        assert!((final_score - 63.0).abs() < 1e-9);
        assert!(!passed);

        let (on_time, passed) = grade_outcome(&assignment, 90.0, 0.0);
        assert_eq!(on_time, 90.0);
        assert!(passed);
    }
}
