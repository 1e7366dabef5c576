use super::common::*;
use chrono::Duration;
use std::sync::Arc;

use crate::assessment::assignments::{AutoGradeError, AutoGrader, GradeInput};
use crate::assessment::domain::{
    AssignmentSubmission, RubricCriterion, RubricScore, SubmissionContent, SubmissionStatus,
    TestCase, TestCaseResult,
};
use crate::assessment::notifications::NotificationEvent;
use crate::assessment::{AssessmentError, AssessmentService, MemoryNotifier, MemoryStore};
use crate::clock::ManualClock;
use crate::config::AssessmentConfig;

fn essay_text(text: &str) -> SubmissionContent {
    SubmissionContent {
        text: Some(text.to_string()),
        ..SubmissionContent::default()
    }
}

fn raw(score: f64) -> GradeInput {
    GradeInput {
        raw_score: Some(score),
        ..GradeInput::default()
    }
}

#[test]
fn sub_second_overshoot_counts_as_a_late_day() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let due = essay().due_date.unwrap();
    h.clock.set(due + Duration::milliseconds(500));

    let submission = h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("Just past the deadline."))
        .expect("late work accepted");
    assert!(submission.is_late);
    assert_eq!(submission.days_late, 1);
    assert_eq!(submission.late_penalty, 10.0);
}

#[test]
fn late_submission_is_penalised_per_started_day() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let due = essay().due_date.unwrap();
    h.clock.set(due + Duration::days(2) + Duration::hours(5));

    let submission = h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("Lifetimes bound borrows."))
        .expect("late work accepted");
    assert!(submission.is_late);
    assert_eq!(submission.days_late, 3);
    assert_eq!(submission.late_penalty, 30.0);
    assert_eq!(submission.status, SubmissionStatus::Submitted);

    let graded = h
        .service
        .assignments()
        .grade(&grader(), &submission.id, raw(90.0))
        .expect("graded");
    assert_eq!(graded.status, SubmissionStatus::Graded);
    assert_eq!(graded.raw_score, Some(90.0));
    assert!((graded.final_score.unwrap() - 63.0).abs() < 1e-9);
    assert_eq!(graded.passed, Some(false));
    assert_eq!(graded.graded_by, Some(grader().user_id));

    let notices = h.events(NotificationEvent::SubmissionGraded);
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].details.get("final_score").map(String::as_str),
        Some("63.00")
    );
}

#[test]
fn on_time_submission_keeps_raw_score() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);

    let submission = h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("On time."))
        .unwrap();
    assert!(!submission.is_late);
    assert_eq!(submission.late_penalty, 0.0);

    let graded = h
        .service
        .assignments()
        .grade(&grader(), &submission.id, raw(72.0))
        .unwrap();
    assert_eq!(graded.final_score, Some(72.0));
    assert_eq!(graded.passed, Some(true));
}

#[test]
fn closed_deadline_rejects_late_work() {
    let store = seeded_store();
    let mut strict = essay();
    strict.late_policy.allow_late = false;
    store.seed_assignment(strict.clone());
    let h = harness_from(store, MemoryNotifier::default(), AssessmentConfig::default());
    let ada = learner();
    enroll(&h, &ada);
    h.clock.set(strict.due_date.unwrap() + Duration::seconds(1));

    match h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("Too late."))
    {
        Err(AssessmentError::DeadlinePassed { due_date }) => {
            assert_eq!(Some(due_date), strict.due_date)
        }
        other => panic!("expected deadline error, got {other:?}"),
    }
}

#[test]
fn submissions_are_bounded_by_max_attempts() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let pipeline = h.service.assignments();

    let first = pipeline.submit(&ada, &essay_id(), essay_text("v1")).unwrap();
    let second = pipeline.submit(&ada, &essay_id(), essay_text("v2")).unwrap();
    assert_eq!((first.attempt_number, second.attempt_number), (1, 2));

    let third = pipeline.submit(&ada, &essay_id(), essay_text("v3"));
    assert!(matches!(
        third,
        Err(AssessmentError::AttemptLimitExceeded {
            max_attempts: 2,
            used: 2
        })
    ));

    let history = pipeline.list_submissions(&ada, &essay_id()).unwrap();
    assert_eq!(history.remaining, Some(0));
    assert_eq!(history.submissions.len(), 2);
}

#[test]
fn intake_validates_enrollment_and_content() {
    let h = harness();
    let ada = learner();
    let denied = h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("hi"));
    assert!(matches!(denied, Err(AssessmentError::Forbidden(_))));

    enroll(&h, &ada);
    let blank = h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("   "));
    assert!(matches!(blank, Err(AssessmentError::ValidationError(_))));
}

#[test]
fn only_graders_grade_and_only_once() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let pipeline = h.service.assignments();
    let submission = pipeline.submit(&ada, &essay_id(), essay_text("v1")).unwrap();

    let self_graded = pipeline.grade(&ada, &submission.id, raw(100.0));
    assert!(matches!(self_graded, Err(AssessmentError::Forbidden(_))));

    pipeline.grade(&grader(), &submission.id, raw(80.0)).unwrap();
    match pipeline.grade(&admin(), &submission.id, raw(95.0)) {
        Err(AssessmentError::AlreadyGraded { submission_id }) => {
            assert_eq!(submission_id, submission.id)
        }
        other => panic!("expected already graded, got {other:?}"),
    }
    let stored = pipeline.get_submission(&ada, &submission.id).unwrap();
    assert_eq!(stored.raw_score, Some(80.0));
}

#[test]
fn returned_submission_is_corrected_by_resubmitting() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let pipeline = h.service.assignments();
    let first = pipeline.submit(&ada, &essay_id(), essay_text("draft")).unwrap();

    let returned = pipeline
        .return_for_revision(&grader(), &first.id, Some("Cite the nomicon.".to_string()))
        .unwrap();
    assert_eq!(returned.status, SubmissionStatus::Returned);
    assert_eq!(h.events(NotificationEvent::SubmissionReturned).len(), 1);

    let regrade = pipeline.grade(&grader(), &first.id, raw(50.0));
    assert!(matches!(regrade, Err(AssessmentError::ValidationError(_))));

    let second = pipeline.submit(&ada, &essay_id(), essay_text("final")).unwrap();
    assert_eq!(second.attempt_number, 2);
    let graded = pipeline.grade(&grader(), &second.id, raw(88.0)).unwrap();
    assert_eq!(graded.passed, Some(true));
}

#[test]
fn rubric_breakdown_sets_the_raw_score() {
    let store = seeded_store();
    let mut rubric = essay();
    rubric.rubric = vec![
        RubricCriterion {
            criterion: "accuracy".to_string(),
            max_points: 30.0,
        },
        RubricCriterion {
            criterion: "clarity".to_string(),
            max_points: 20.0,
        },
    ];
    store.seed_assignment(rubric);
    let h = harness_from(store, MemoryNotifier::default(), AssessmentConfig::default());
    let ada = learner();
    enroll(&h, &ada);
    let pipeline = h.service.assignments();
    let submission = pipeline.submit(&ada, &essay_id(), essay_text("v1")).unwrap();

    let graded = pipeline
        .grade(
            &grader(),
            &submission.id,
            GradeInput {
                raw_score: None,
                rubric_scores: vec![
                    RubricScore {
                        criterion: "accuracy".to_string(),
                        points: 27.0,
                        comment: None,
                    },
                    RubricScore {
                        criterion: "clarity".to_string(),
                        points: 10.0,
                        comment: Some("Dense in places.".to_string()),
                    },
                ],
                feedback: Some("Solid.".to_string()),
            },
        )
        .unwrap();
    assert_eq!(graded.raw_score, Some(37.0));
    assert_eq!(graded.rubric_scores.len(), 2);
    // 37 of 50 is 74%.
    assert_eq!(graded.passed, Some(true));
}

struct FixedRunner;

impl AutoGrader for FixedRunner {
    fn run_test_cases(
        &self,
        _submission: &AssignmentSubmission,
        test_cases: &[TestCase],
    ) -> Result<Option<Vec<TestCaseResult>>, AutoGradeError> {
        Ok(Some(
            test_cases
                .iter()
                .enumerate()
                .map(|(index, case)| TestCaseResult {
                    name: case.name.clone(),
                    passed: index == 0,
                    points_awarded: if index == 0 { case.points } else { 0.0 },
                    output: None,
                })
                .collect(),
        ))
    }
}

struct BrokenRunner;

impl AutoGrader for BrokenRunner {
    fn run_test_cases(
        &self,
        _submission: &AssignmentSubmission,
        _test_cases: &[TestCase],
    ) -> Result<Option<Vec<TestCaseResult>>, AutoGradeError> {
        Err(AutoGradeError::Runner("sandbox offline".to_string()))
    }
}

fn auto_graded_store() -> MemoryStore {
    let store = seeded_store();
    let mut kata = essay();
    kata.auto_grade = true;
    kata.test_cases = vec![
        TestCase {
            name: "sums".to_string(),
            input: "1 2".to_string(),
            expected_output: "3".to_string(),
            points: 80.0,
            hidden: false,
        },
        TestCase {
            name: "overflow".to_string(),
            input: "255 1".to_string(),
            expected_output: "error".to_string(),
            points: 20.0,
            hidden: true,
        },
    ];
    store.seed_assignment(kata);
    store
}

fn service_with(
    grader: Arc<dyn AutoGrader>,
) -> (Arc<MemoryNotifier>, AssessmentService<MemoryStore, MemoryNotifier>) {
    let notifier = Arc::new(MemoryNotifier::default());
    let service = AssessmentService::with_auto_grader(
        Arc::new(auto_graded_store()),
        notifier.clone(),
        Arc::new(ManualClock::new(epoch())),
        AssessmentConfig::default(),
        grader,
    );
    (notifier, service)
}

#[test]
fn pluggable_auto_grader_grades_on_submit() {
    let (notifier, service) = service_with(Arc::new(FixedRunner));
    let ada = learner();
    service.progress().enroll(&ada, &course_id()).unwrap();

    let submission = service
        .assignments()
        .submit(&ada, &essay_id(), SubmissionContent {
            code: Some("fn add(a: u8, b: u8) -> u8 { a + b }".to_string()),
            ..SubmissionContent::default()
        })
        .unwrap();
    assert_eq!(submission.status, SubmissionStatus::Graded);
    assert_eq!(submission.raw_score, Some(80.0));
    assert_eq!(submission.graded_by, None);
    assert_eq!(submission.test_results.len(), 2);
    assert_eq!(submission.passed, Some(true));
    assert_eq!(notifier.events().len(), 1);
}

#[test]
fn default_and_failing_auto_graders_leave_work_for_review() {
    let h = harness_from(
        auto_graded_store(),
        MemoryNotifier::default(),
        AssessmentConfig::default(),
    );
    let ada = learner();
    enroll(&h, &ada);
    let pending = h
        .service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("fn main() {}"))
        .unwrap();
    assert_eq!(pending.status, SubmissionStatus::Grading);

    let graded = h
        .service
        .assignments()
        .grade(&grader(), &pending.id, raw(75.0))
        .unwrap();
    assert_eq!(graded.status, SubmissionStatus::Graded);

    let (_, service) = service_with(Arc::new(BrokenRunner));
    service.progress().enroll(&ada, &course_id()).unwrap();
    let stuck = service
        .assignments()
        .submit(&ada, &essay_id(), essay_text("fn main() {}"))
        .unwrap();
    assert_eq!(stuck.status, SubmissionStatus::Grading);
}
