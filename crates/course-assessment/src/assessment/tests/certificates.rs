use super::common::*;
use chrono::Duration;

use crate::assessment::assignments::GradeInput;
use crate::assessment::domain::{
    AttemptId, AttemptStatus, CertificateCode, QuizAttempt, SubmissionContent,
};
use crate::assessment::notifications::NotificationEvent;
use crate::assessment::repository::AttemptRepository;
use crate::assessment::AssessmentError;
use crate::config::AssessmentConfig;

fn record_quiz_result(h: &Harness, attempt_number: u32, percentage: f64) {
    let mut attempt = QuizAttempt::start(
        AttemptId::new(format!("seeded-{attempt_number}")),
        learner().user_id,
        &quiz(),
        attempt_number,
        epoch(),
    );
    attempt.status = AttemptStatus::Completed;
    attempt.percentage = percentage;
    attempt.score = percentage / 10.0;
    attempt.passed = true;
    attempt.completed_at = Some(epoch());
    h.store.insert_attempt(attempt).expect("seeded attempt");
}

fn graded_essay(h: &Harness, raw_score: f64) {
    let pipeline = h.service.assignments();
    let submission = pipeline
        .submit(
            &learner(),
            &essay_id(),
            SubmissionContent {
                text: Some("Borrowing is scoped aliasing.".to_string()),
                ..SubmissionContent::default()
            },
        )
        .unwrap();
    pipeline
        .grade(
            &grader(),
            &submission.id,
            GradeInput {
                raw_score: Some(raw_score),
                ..GradeInput::default()
            },
        )
        .unwrap();
}

#[test]
fn incomplete_course_is_not_certified() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    h.service
        .progress()
        .complete_topic(&ada, &course_id(), &topic(1))
        .unwrap();

    match h.service.certificates().request(&ada, &course_id()) {
        Err(AssessmentError::NotCompleted { progress }) => assert_eq!(progress, 13),
        other => panic!("expected not completed, got {other:?}"),
    }
    assert!(matches!(
        h.service.certificates().request(&other_learner(), &course_id()),
        Err(AssessmentError::Forbidden(_))
    ));
}

#[test]
fn weighted_score_and_grade_are_snapshotted() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    record_quiz_result(&h, 1, 70.0);
    record_quiz_result(&h, 2, 90.0);
    graded_essay(&h, 90.0);
    h.service
        .progress()
        .record_topic_access(&ada, &course_id(), &topic(1), 5400)
        .unwrap();
    complete_course(&h, &ada);

    let certificate = h.service.certificates().request(&ada, &course_id()).unwrap();
    assert_eq!(certificate.final_score, 86.0);
    assert_eq!(certificate.grade, "B+");
    assert_eq!(certificate.holder_name, "Ada Lovelace");
    assert_eq!(certificate.course_title, "Rust Fundamentals");
    assert!(certificate.code.as_str().starts_with("CERT-"));
    assert!(certificate.expires_at.is_none());

    let metadata = &certificate.metadata;
    assert_eq!(metadata.modules, 2);
    assert_eq!(metadata.topics, 8);
    assert_eq!(metadata.quizzes_completed, 2);
    assert_eq!(metadata.assignments_graded, 1);
    assert_eq!(metadata.average_quiz_score, 80.0);
    assert_eq!(metadata.average_assignment_score, 90.0);
    assert_eq!(metadata.total_hours, 1.5);

    assert_eq!(h.events(NotificationEvent::CertificateIssued).len(), 1);
}

#[test]
fn no_scores_yield_zero_and_fallback_grade() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    complete_course(&h, &ada);

    let certificate = h.service.certificates().request(&ada, &course_id()).unwrap();
    assert_eq!(certificate.final_score, 0.0);
    assert_eq!(certificate.grade, "Pass");
}

#[test]
fn second_request_reports_the_existing_code() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    complete_course(&h, &ada);
    let issuer = h.service.certificates();

    let issued = issuer.request(&ada, &course_id()).unwrap();
    match issuer.request(&ada, &course_id()) {
        Err(AssessmentError::AlreadyIssued { certificate_code }) => {
            assert_eq!(certificate_code, issued.code)
        }
        other => panic!("expected already issued, got {other:?}"),
    }
    assert_eq!(issuer.list_for_learner(&ada).unwrap().len(), 1);
}

#[test]
fn revocation_is_visible_and_not_repeatable() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    complete_course(&h, &ada);
    let issuer = h.service.certificates();
    let issued = issuer.request(&ada, &course_id()).unwrap();

    let verified = issuer.verify(&issued.code).unwrap();
    assert!(verified.valid);
    assert_eq!(verified.holder_name, "Ada Lovelace");

    assert!(matches!(
        issuer.revoke(&ada, &issued.code, "self-service".to_string()),
        Err(AssessmentError::Forbidden(_))
    ));
    issuer
        .revoke(&admin(), &issued.code, "academic misconduct".to_string())
        .unwrap();
    assert!(matches!(
        issuer.revoke(&admin(), &issued.code, "again".to_string()),
        Err(AssessmentError::AlreadyRevoked { .. })
    ));

    let verified = issuer.verify(&issued.code).unwrap();
    assert!(!verified.valid);
    assert!(verified.revoked);
    assert_eq!(verified.revoked_reason.as_deref(), Some("academic misconduct"));
    assert_eq!(h.events(NotificationEvent::CertificateRevoked).len(), 1);

    assert!(matches!(
        issuer.verify(&CertificateCode::new("CERT-missing")),
        Err(AssessmentError::NotFound { .. })
    ));
}

#[test]
fn reinstating_is_explicit_and_respects_the_active_slot() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    complete_course(&h, &ada);
    let issuer = h.service.certificates();

    let original = issuer.request(&ada, &course_id()).unwrap();
    issuer
        .revoke(&admin(), &original.code, "issued in error".to_string())
        .unwrap();

    h.clock.advance(Duration::seconds(5));
    let replacement = issuer.request(&ada, &course_id()).unwrap();
    assert_ne!(replacement.code, original.code);

    assert!(matches!(
        issuer.reinstate(&admin(), &original.code),
        Err(AssessmentError::AlreadyIssued { .. })
    ));

    issuer
        .revoke(&admin(), &replacement.code, "duplicate".to_string())
        .unwrap();
    let restored = issuer.reinstate(&admin(), &original.code).unwrap();
    assert!(restored.is_active());
    assert!(restored.revoked_reason.is_none());
    assert!(matches!(
        issuer.reinstate(&admin(), &original.code),
        Err(AssessmentError::ValidationError(_))
    ));
}

#[test]
fn configured_validity_expires_certificates() {
    let h = harness_with_config(AssessmentConfig {
        certificate_validity_days: Some(30),
        ..AssessmentConfig::default()
    });
    let ada = learner();
    enroll(&h, &ada);
    complete_course(&h, &ada);
    let issued = h.service.certificates().request(&ada, &course_id()).unwrap();
    assert_eq!(issued.expires_at, Some(epoch() + Duration::days(30)));

    h.clock.advance(Duration::days(31));
    let verified = h.service.certificates().verify(&issued.code).unwrap();
    assert!(verified.expired);
    assert!(!verified.valid);
    assert!(!verified.revoked);
}

#[test]
fn gradebook_lists_every_enrolled_learner() {
    let h = harness();
    let ada = learner();
    let linus = other_learner();
    enroll(&h, &ada);
    enroll(&h, &linus);
    graded_essay(&h, 90.0);

    let csv = h.service.gradebook_csv(&grader(), &course_id()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("ada,active,0,0,0.00,1,90.00,54.00,Pass,"));
    assert!(lines[2].starts_with("linus,active,0,0,0.00,0,0.00,0.00,Pass,"));

    assert!(matches!(
        h.service.gradebook_csv(&ada, &course_id()),
        Err(AssessmentError::Forbidden(_))
    ));
}
