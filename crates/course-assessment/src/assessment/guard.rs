use tracing::debug;

use super::domain::{CourseId, Enrollment, UserId};
use super::error::AssessmentError;
use super::repository::EnrollmentRepository;

/// Runs a read-check-write unit, re-running it from a fresh read whenever
/// the write loses a race (stale version or unique-constraint hit). The
/// re-run is what turns a lost race into the proper business error.
pub(crate) fn retry_on_contention<T>(
    budget: u32,
    operation: &'static str,
    mut unit: impl FnMut() -> Result<T, AssessmentError>,
) -> Result<T, AssessmentError> {
    let mut retries = 0;
    loop {
        match unit() {
            Err(AssessmentError::Repository(err)) if err.is_contention() => {
                if retries >= budget {
                    return Err(AssessmentError::Conflict(format!(
                        "{operation} gave up after {retries} retries: {err}"
                    )));
                }
                retries += 1;
                debug!(operation, retries, error = %err, "retrying after write contention");
            }
            other => return other,
        }
    }
}

/// Active (non-dropped) enrollment or `Forbidden`.
pub(crate) fn require_enrollment<S>(
    store: &S,
    learner_id: &UserId,
    course_id: &CourseId,
) -> Result<Enrollment, AssessmentError>
where
    S: EnrollmentRepository + ?Sized,
{
    match store.fetch_enrollment(learner_id, course_id)? {
        Some(enrollment) if enrollment.grants_access() => Ok(enrollment),
        Some(_) => Err(AssessmentError::Forbidden(format!(
            "enrollment in course '{course_id}' was dropped"
        ))),
        None => Err(AssessmentError::Forbidden(format!(
            "not enrolled in course '{course_id}'"
        ))),
    }
}
