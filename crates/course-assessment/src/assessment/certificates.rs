use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    AttemptStatus, Certificate, CertificateCode, CertificateMetadata, Course, CourseId,
    Enrollment, EnrollmentStatus, SubmissionStatus, UserId,
};
use super::error::AssessmentError;
use super::guard::retry_on_contention;
use super::notifications::{dispatch, Notification, NotificationEvent, Notifier};
use super::repository::AssessmentStore;
use super::scoring::{self, ScoringRules};
use crate::auth::Principal;
use crate::clock::Clock;

const CODE_SUFFIX_LEN: usize = 6;

/// Aggregated scores for one learner in one course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseStanding {
    pub learner_id: UserId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub progress: u8,
    pub quizzes_completed: usize,
    pub average_quiz_score: f64,
    pub assignments_graded: usize,
    pub average_assignment_score: f64,
    pub final_score: f64,
    pub grade: String,
    pub total_hours: f64,
}

/// Public projection returned by verification. Carries no learner data
/// beyond the holder's name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateVerification {
    pub code: CertificateCode,
    pub valid: bool,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
    pub expired: bool,
    pub holder_name: String,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub grade: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `CERT-<yyyymmddHHMMSS>-<6 alphanumerics>`.
pub(crate) fn generate_code(now: DateTime<Utc>) -> CertificateCode {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_SUFFIX_LEN)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect();
    CertificateCode(format!("CERT-{}-{suffix}", now.format("%Y%m%d%H%M%S")))
}

/// Issues, verifies and revokes course certificates.
pub struct CertificateIssuer<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    rules: Arc<ScoringRules>,
    validity_days: Option<u32>,
    write_retries: u32,
}

impl<S, N> CertificateIssuer<S, N>
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        rules: Arc<ScoringRules>,
        validity_days: Option<u32>,
        write_retries: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            rules,
            validity_days,
            write_retries,
        }
    }

    fn course(&self, course_id: &CourseId) -> Result<Course, AssessmentError> {
        self.store
            .course(course_id)?
            .ok_or_else(|| AssessmentError::not_found("course", course_id))
    }

    fn certificate(&self, code: &CertificateCode) -> Result<Certificate, AssessmentError> {
        self.store
            .fetch_certificate(code)?
            .ok_or_else(|| AssessmentError::not_found("certificate", code))
    }

    fn require_admin(principal: &Principal) -> Result<(), AssessmentError> {
        if principal.is_admin() {
            Ok(())
        } else {
            Err(AssessmentError::Forbidden(
                "certificate administration requires the admin role".to_string(),
            ))
        }
    }

    /// Reads the learner's stored attempts, submissions and topic time and
    /// folds them into weighted scores. Nothing is re-scored here.
    pub fn standing(
        &self,
        course: &Course,
        enrollment: &Enrollment,
    ) -> Result<CourseStanding, AssessmentError> {
        let learner_id = &enrollment.learner_id;

        let quiz_scores: Vec<f64> = self
            .store
            .attempts_for_course(learner_id, &course.id)?
            .iter()
            .filter(|attempt| attempt.status == AttemptStatus::Completed)
            .map(|attempt| attempt.percentage)
            .collect();
        let assignment_scores: Vec<f64> = self
            .store
            .submissions_for_course(learner_id, &course.id)?
            .iter()
            .filter(|submission| submission.status == SubmissionStatus::Graded)
            .filter_map(|submission| submission.final_score)
            .collect();
        let seconds: u64 = self
            .store
            .topic_progress_for_course(learner_id, &course.id)?
            .iter()
            .map(|topic| topic.time_spent_seconds)
            .sum();

        let average_quiz_score = round2(scoring::mean(&quiz_scores));
        let average_assignment_score = round2(scoring::mean(&assignment_scores));
        let final_score = round2(
            self.rules
                .final_course_score(average_quiz_score, average_assignment_score),
        );

        Ok(CourseStanding {
            learner_id: learner_id.clone(),
            course_id: course.id.clone(),
            status: enrollment.status,
            progress: enrollment.progress,
            quizzes_completed: quiz_scores.len(),
            average_quiz_score,
            assignments_graded: assignment_scores.len(),
            average_assignment_score,
            final_score,
            grade: self.rules.letter_grade(final_score).to_string(),
            total_hours: round2(seconds as f64 / 3600.0),
        })
    }

    /// Exactly-once issuance per (learner, course) while not revoked. The
    /// store rejects a second active certificate at insert time; the retry
    /// re-reads and reports `AlreadyIssued` with the winner's code.
    pub fn request(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<Certificate, AssessmentError> {
        let course = self.course(course_id)?;
        let learner_id = &principal.user_id;
        let enrollment = self
            .store
            .fetch_enrollment(learner_id, course_id)?
            .ok_or_else(|| {
                AssessmentError::Forbidden(format!("not enrolled in course '{course_id}'"))
            })?;
        if enrollment.status != EnrollmentStatus::Completed {
            return Err(AssessmentError::NotCompleted {
                progress: enrollment.progress,
            });
        }

        let standing = self.standing(&course, &enrollment)?;

        let certificate = retry_on_contention(self.write_retries, "issue_certificate", || {
            if let Some(existing) = self.store.active_certificate(learner_id, course_id)? {
                return Err(AssessmentError::AlreadyIssued {
                    certificate_code: existing.code,
                });
            }

            let now = self.clock.now();
            let mut code = generate_code(now);
            while self.store.fetch_certificate(&code)?.is_some() {
                code = generate_code(now);
            }

            let certificate = Certificate {
                code,
                learner_id: learner_id.clone(),
                holder_name: principal.display_name.clone(),
                course_id: course.id.clone(),
                course_title: course.title.clone(),
                issued_at: now,
                completed_at: enrollment.completed_at.unwrap_or(now),
                expires_at: self
                    .validity_days
                    .map(|days| now + Duration::days(i64::from(days))),
                final_score: standing.final_score,
                grade: standing.grade.clone(),
                revoked: false,
                revoked_reason: None,
                revoked_at: None,
                metadata: CertificateMetadata {
                    modules: course.modules.len(),
                    topics: course.topic_count(),
                    quizzes_completed: standing.quizzes_completed,
                    assignments_graded: standing.assignments_graded,
                    average_quiz_score: standing.average_quiz_score,
                    average_assignment_score: standing.average_assignment_score,
                    total_hours: standing.total_hours,
                },
                version: 0,
            };
            Ok(self.store.insert_certificate(certificate)?)
        })?;

        info!(
            learner = %learner_id,
            course = %course_id,
            certificate = %certificate.code,
            final_score = certificate.final_score,
            grade = %certificate.grade,
            "certificate issued"
        );
        dispatch(
            self.notifier.as_ref(),
            Notification::new(learner_id.clone(), NotificationEvent::CertificateIssued)
                .with("certificate_code", &certificate.code)
                .with("course_title", &certificate.course_title)
                .with("grade", &certificate.grade),
        );
        Ok(certificate)
    }

    /// Public, read-only.
    pub fn verify(
        &self,
        code: &CertificateCode,
    ) -> Result<CertificateVerification, AssessmentError> {
        let certificate = self.certificate(code)?;
        let expired = certificate.is_expired(self.clock.now());
        Ok(CertificateVerification {
            code: certificate.code,
            valid: !certificate.revoked && !expired,
            revoked: certificate.revoked,
            revoked_reason: certificate.revoked_reason,
            expired,
            holder_name: certificate.holder_name,
            course_title: certificate.course_title,
            issued_at: certificate.issued_at,
            expires_at: certificate.expires_at,
            grade: certificate.grade,
        })
    }

    pub fn revoke(
        &self,
        principal: &Principal,
        code: &CertificateCode,
        reason: String,
    ) -> Result<Certificate, AssessmentError> {
        Self::require_admin(principal)?;
        if reason.trim().is_empty() {
            return Err(AssessmentError::ValidationError(
                "a revocation reason is required".to_string(),
            ));
        }

        let revoked = retry_on_contention(self.write_retries, "revoke_certificate", || {
            let mut certificate = self.certificate(code)?;
            if certificate.revoked {
                return Err(AssessmentError::AlreadyRevoked {
                    certificate_code: certificate.code,
                });
            }
            certificate.revoked = true;
            certificate.revoked_reason = Some(reason.trim().to_string());
            certificate.revoked_at = Some(self.clock.now());
            Ok(self.store.update_certificate(certificate)?)
        })?;

        warn!(
            certificate = %revoked.code,
            learner = %revoked.learner_id,
            admin = %principal.user_id,
            reason = revoked.revoked_reason.as_deref().unwrap_or_default(),
            "certificate revoked"
        );
        dispatch(
            self.notifier.as_ref(),
            Notification::new(revoked.learner_id.clone(), NotificationEvent::CertificateRevoked)
                .with("certificate_code", &revoked.code)
                .with("reason", revoked.revoked_reason.as_deref().unwrap_or_default()),
        );
        Ok(revoked)
    }

    /// Explicit un-revoke. Refused while another active certificate exists
    /// for the same learner and course.
    pub fn reinstate(
        &self,
        principal: &Principal,
        code: &CertificateCode,
    ) -> Result<Certificate, AssessmentError> {
        Self::require_admin(principal)?;

        let reinstated = retry_on_contention(self.write_retries, "reinstate_certificate", || {
            let mut certificate = self.certificate(code)?;
            if !certificate.revoked {
                return Err(AssessmentError::ValidationError(format!(
                    "certificate '{code}' is not revoked"
                )));
            }
            if let Some(active) = self
                .store
                .active_certificate(&certificate.learner_id, &certificate.course_id)?
            {
                return Err(AssessmentError::AlreadyIssued {
                    certificate_code: active.code,
                });
            }
            certificate.revoked = false;
            certificate.revoked_reason = None;
            certificate.revoked_at = None;
            Ok(self.store.update_certificate(certificate)?)
        })?;

        info!(
            certificate = %reinstated.code,
            learner = %reinstated.learner_id,
            admin = %principal.user_id,
            "certificate reinstated"
        );
        Ok(reinstated)
    }

    pub fn list_for_learner(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Certificate>, AssessmentError> {
        Ok(self.store.certificates_for_learner(&principal.user_id)?)
    }

    /// One standing per enrolled learner, ordered by learner id.
    pub fn gradebook(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<Vec<CourseStanding>, AssessmentError> {
        if !principal.can_grade() {
            return Err(AssessmentError::Forbidden(
                "the gradebook requires the grader or admin role".to_string(),
            ));
        }
        let course = self.course(course_id)?;
        let mut enrollments = self.store.enrollments_for_course(course_id)?;
        enrollments.sort_by(|a, b| a.learner_id.cmp(&b.learner_id));
        enrollments
            .iter()
            .map(|enrollment| self.standing(&course, enrollment))
            .collect()
    }
}
