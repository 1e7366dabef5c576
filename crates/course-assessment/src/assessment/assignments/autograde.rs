use super::super::domain::{AssignmentSubmission, TestCase, TestCaseResult};

#[derive(Debug, thiserror::Error)]
pub enum AutoGradeError {
    #[error("test runner failed: {0}")]
    Runner(String),
}

/// Strategy for executing an assignment's test cases against a submission.
///
/// `Ok(None)` means the strategy produced no verdict and the submission
/// waits for a human grader. `Ok(Some(results))` is graded from the points
/// the results award, through the same transition a grader would use.
pub trait AutoGrader: Send + Sync {
    fn run_test_cases(
        &self,
        submission: &AssignmentSubmission,
        test_cases: &[TestCase],
    ) -> Result<Option<Vec<TestCaseResult>>, AutoGradeError>;
}

/// Default strategy: never executes code, leaves every submission for review.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualReviewGrader;

impl AutoGrader for ManualReviewGrader {
    fn run_test_cases(
        &self,
        _submission: &AssignmentSubmission,
        _test_cases: &[TestCase],
    ) -> Result<Option<Vec<TestCaseResult>>, AutoGradeError> {
        Ok(None)
    }
}
