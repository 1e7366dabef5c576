//! Storage seams. Mutable records carry a `version`; every `update_*` is a
//! compare-and-swap against it and every `insert_*` enforces the unique
//! constraints named in [`constraint`], so engines never rely on a
//! read-then-write window being quiet.

use super::domain::{
    Assignment, AssignmentId, AssignmentSubmission, AttemptId, Certificate, CertificateCode,
    Course, CourseId, CourseRating, Enrollment, Quiz, QuizAttempt, QuizId, SubmissionId, TopicId,
    TopicProgress, UserId,
};

/// Names of the unique constraints stores must enforce.
pub mod constraint {
    pub const ENROLLMENT: &str = "enrollment(learner, course)";
    pub const ATTEMPT_NUMBER: &str = "quiz_attempt(learner, quiz, attempt_number)";
    pub const ACTIVE_ATTEMPT: &str = "quiz_attempt(learner, quiz) where in_progress";
    pub const SUBMISSION_NUMBER: &str = "submission(learner, assignment, attempt_number)";
    pub const CERTIFICATE_CODE: &str = "certificate(code)";
    pub const ACTIVE_CERTIFICATE: &str = "certificate(learner, course) where not revoked";
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),
    #[error("record was modified concurrently")]
    Stale,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Lost a race; re-reading fresh state and retrying may succeed.
    pub fn is_contention(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_) | RepositoryError::Stale)
    }
}

/// Authored content: courses, quizzes and assignments.
pub trait CatalogRepository: Send + Sync {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn quiz(&self, id: &QuizId) -> Result<Option<Quiz>, RepositoryError>;
    fn assignment(&self, id: &AssignmentId) -> Result<Option<Assignment>, RepositoryError>;
    fn quizzes_for_course(&self, course_id: &CourseId) -> Result<Vec<Quiz>, RepositoryError>;
    fn assignments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Assignment>, RepositoryError>;
}

pub trait EnrollmentRepository: Send + Sync {
    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError>;
    fn update_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError>;
    fn fetch_enrollment(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn delete_enrollment(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<bool, RepositoryError>;
    fn enrollments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError>;
}

pub trait TopicProgressRepository: Send + Sync {
    fn fetch_topic_progress(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
        topic_id: &TopicId,
    ) -> Result<Option<TopicProgress>, RepositoryError>;
    /// Insert when absent (version 0), compare-and-swap otherwise.
    fn upsert_topic_progress(
        &self,
        progress: TopicProgress,
    ) -> Result<TopicProgress, RepositoryError>;
    fn topic_progress_for_course(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<TopicProgress>, RepositoryError>;
}

pub trait AttemptRepository: Send + Sync {
    fn insert_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError>;
    fn update_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError>;
    fn fetch_attempt(&self, id: &AttemptId) -> Result<Option<QuizAttempt>, RepositoryError>;
    /// Attempts ordered by attempt number.
    fn attempts_for(
        &self,
        learner_id: &UserId,
        quiz_id: &QuizId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError>;
    fn attempts_for_course(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError>;
}

pub trait SubmissionRepository: Send + Sync {
    fn insert_submission(
        &self,
        submission: AssignmentSubmission,
    ) -> Result<AssignmentSubmission, RepositoryError>;
    fn update_submission(
        &self,
        submission: AssignmentSubmission,
    ) -> Result<AssignmentSubmission, RepositoryError>;
    fn fetch_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<AssignmentSubmission>, RepositoryError>;
    /// Submissions ordered by attempt number.
    fn submissions_for(
        &self,
        learner_id: &UserId,
        assignment_id: &AssignmentId,
    ) -> Result<Vec<AssignmentSubmission>, RepositoryError>;
    fn submissions_for_course(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<AssignmentSubmission>, RepositoryError>;
}

pub trait CertificateRepository: Send + Sync {
    fn insert_certificate(&self, certificate: Certificate)
        -> Result<Certificate, RepositoryError>;
    fn update_certificate(&self, certificate: Certificate)
        -> Result<Certificate, RepositoryError>;
    fn fetch_certificate(
        &self,
        code: &CertificateCode,
    ) -> Result<Option<Certificate>, RepositoryError>;
    fn active_certificate(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError>;
    fn certificates_for_learner(
        &self,
        learner_id: &UserId,
    ) -> Result<Vec<Certificate>, RepositoryError>;
}

pub trait RatingRepository: Send + Sync {
    /// Compare-and-swap on `version`; a course with no stored aggregate is at version 0.
    fn save_course_rating(&self, rating: CourseRating) -> Result<CourseRating, RepositoryError>;
    fn course_rating(&self, course_id: &CourseId) -> Result<Option<CourseRating>, RepositoryError>;
}

/// Everything the assessment service needs from storage.
pub trait AssessmentStore:
    CatalogRepository
    + EnrollmentRepository
    + TopicProgressRepository
    + AttemptRepository
    + SubmissionRepository
    + CertificateRepository
    + RatingRepository
{
}

impl<T> AssessmentStore for T where
    T: CatalogRepository
        + EnrollmentRepository
        + TopicProgressRepository
        + AttemptRepository
        + SubmissionRepository
        + CertificateRepository
        + RatingRepository
{
}
