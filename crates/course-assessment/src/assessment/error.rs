use chrono::{DateTime, Utc};

use super::domain::{AttemptId, AttemptStatus, CertificateCode, QuestionId, SubmissionId};
use super::repository::RepositoryError;

/// Failure taxonomy shared by every engine. All variants except
/// `Repository` and `Export` are expected, caller-recoverable conditions.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("attempt limit reached ({used} of {max_attempts} used)")]
    AttemptLimitExceeded { max_attempts: u32, used: u32 },
    #[error("attempt '{attempt_id}' is still in progress")]
    AttemptAlreadyActive { attempt_id: AttemptId },
    #[error("attempt '{attempt_id}' is {} and accepts no changes", .status.label())]
    AttemptNotActive {
        attempt_id: AttemptId,
        status: AttemptStatus,
    },
    #[error("question '{question_id}' was already answered")]
    DuplicateAnswer { question_id: QuestionId },
    #[error("deadline passed at {due_date} and late submissions are closed")]
    DeadlinePassed { due_date: DateTime<Utc> },
    #[error("submission '{submission_id}' is already graded")]
    AlreadyGraded { submission_id: SubmissionId },
    #[error("certificate '{certificate_code}' already issued for this course")]
    AlreadyIssued { certificate_code: CertificateCode },
    #[error("certificate '{certificate_code}' is already revoked")]
    AlreadyRevoked { certificate_code: CertificateCode },
    #[error("course not completed (progress {progress}%)")]
    NotCompleted { progress: u8 },
    #[error("invalid input: {0}")]
    ValidationError(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("gradebook export failed: {0}")]
    Export(#[from] csv::Error),
}

impl AssessmentError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable tag used in API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AssessmentError::NotFound { .. } => "not_found",
            AssessmentError::Forbidden(_) => "forbidden",
            AssessmentError::AttemptLimitExceeded { .. } => "attempt_limit_exceeded",
            AssessmentError::AttemptAlreadyActive { .. } => "attempt_already_active",
            AssessmentError::AttemptNotActive { .. } => "attempt_not_active",
            AssessmentError::DuplicateAnswer { .. } => "duplicate_answer",
            AssessmentError::DeadlinePassed { .. } => "deadline_passed",
            AssessmentError::AlreadyGraded { .. } => "already_graded",
            AssessmentError::AlreadyIssued { .. } => "already_issued",
            AssessmentError::AlreadyRevoked { .. } => "already_revoked",
            AssessmentError::NotCompleted { .. } => "not_completed",
            AssessmentError::ValidationError(_) => "validation_error",
            AssessmentError::Conflict(_) => "conflict",
            AssessmentError::Repository(_) | AssessmentError::Export(_) => "internal",
        }
    }
}
