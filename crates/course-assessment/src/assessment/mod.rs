//! Learner assessment and progress: quiz attempts, assignment grading,
//! topic and course progress, and certificate issuance.
//!
//! Each engine reads and writes through the repository traits only. Guarded
//! writes (compare-and-swap updates, constraint-checked inserts) keep the
//! per-learner invariants intact when requests interleave.

pub mod assignments;
pub mod certificates;
pub mod domain;
pub mod error;
pub mod gradebook;
pub(crate) mod guard;
pub mod memory;
pub mod notifications;
pub mod progress;
pub mod quiz;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use assignments::{
    AssignmentGradingPipeline, AutoGradeError, AutoGrader, GradeInput, ManualReviewGrader,
    SubmissionHistory,
};
pub use certificates::{CertificateIssuer, CertificateVerification, CourseStanding};
pub use domain::{
    AnswerResponse, Assignment, AssignmentId, AssignmentSubmission, AttemptId, AttemptStatus,
    Certificate, CertificateCode, Course, CourseId, CourseModule, Enrollment, EnrollmentStatus,
    ModuleId, Question, QuestionId, QuestionKind, Quiz, QuizAttempt, QuizId, SubmissionContent,
    SubmissionId, SubmissionStatus, Topic, TopicId, UserId,
};
pub use error::AssessmentError;
pub use memory::MemoryStore;
pub use notifications::{
    MemoryNotifier, Notification, NotificationEvent, Notifier, NotifyError, TracingNotifier,
};
pub use progress::{CourseProgressView, ModuleProgress, ProgressTracker, ProgressUpdate};
pub use quiz::{
    AnswerReceipt, AttemptHistory, CompletionOutcome, QuizAttemptEngine, QuizPresentation,
};
pub use repository::{AssessmentStore, RepositoryError};
pub use router::assessment_router;
pub use scoring::{GradeBand, ScoringConfig, ScoringRules};
pub use service::AssessmentService;
