use super::common::*;

use crate::assessment::domain::{CourseId, EnrollmentStatus, ModuleId, TopicId, TopicStatus};
use crate::assessment::notifications::NotificationEvent;
use crate::assessment::repository::TopicProgressRepository;
use crate::assessment::AssessmentError;

#[test]
fn eight_topics_complete_the_course_exactly_at_the_last_step() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);

    let mut sequence = Vec::new();
    let mut statuses = Vec::new();
    for n in 1..=8 {
        let update = h
            .service
            .progress()
            .complete_topic(&ada, &course_id(), &topic(n))
            .unwrap();
        sequence.push(update.progress);
        statuses.push(update.course_completed);
        if n < 8 {
            assert_eq!(update.status, EnrollmentStatus::Active);
        } else {
            assert_eq!(update.status, EnrollmentStatus::Completed);
        }
    }

    assert_eq!(sequence, vec![13, 25, 38, 50, 63, 75, 88, 100]);
    assert_eq!(statuses.iter().filter(|done| **done).count(), 1);
    assert_eq!(h.events(NotificationEvent::CourseCompleted).len(), 1);

    let view = h.service.progress().course_progress(&ada, &course_id()).unwrap();
    assert_eq!(view.completed_topics.len(), 8);
    assert_eq!(view.status, EnrollmentStatus::Completed);
}

#[test]
fn repeating_a_topic_never_double_counts() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let tracker = h.service.progress();

    let once = tracker.complete_topic(&ada, &course_id(), &topic(3)).unwrap();
    let twice = tracker.complete_topic(&ada, &course_id(), &topic(3)).unwrap();
    assert!(once.newly_completed);
    assert!(!twice.newly_completed);
    assert_eq!(once.progress, twice.progress);

    let record = h
        .store
        .fetch_topic_progress(&ada.user_id, &course_id(), &topic(3))
        .unwrap()
        .expect("topic record");
    assert_eq!(record.status, TopicStatus::Completed);
}

#[test]
fn completion_checks_course_topic_and_enrollment() {
    let h = harness();
    let ada = learner();
    let tracker = h.service.progress();

    assert!(matches!(
        tracker.complete_topic(&ada, &course_id(), &topic(1)),
        Err(AssessmentError::Forbidden(_))
    ));
    enroll(&h, &ada);
    assert!(matches!(
        tracker.complete_topic(&ada, &course_id(), &TopicId::new("t99")),
        Err(AssessmentError::NotFound { entity: "topic", .. })
    ));
    assert!(matches!(
        tracker.complete_topic(&ada, &CourseId::new("go-101"), &topic(1)),
        Err(AssessmentError::NotFound { entity: "course", .. })
    ));
}

#[test]
fn module_progress_is_derived_per_module() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let tracker = h.service.progress();
    for n in [1, 2, 5] {
        tracker.complete_topic(&ada, &course_id(), &topic(n)).unwrap();
    }

    let first = tracker
        .module_progress(&ada, &course_id(), &ModuleId::new("m1"))
        .unwrap();
    assert_eq!((first.completed, first.total, first.percentage), (2, 4, 50));
    let second = tracker
        .module_progress(&ada, &course_id(), &ModuleId::new("m2"))
        .unwrap();
    assert_eq!(second.percentage, 25);
    assert!(matches!(
        tracker.module_progress(&ada, &course_id(), &ModuleId::new("m9")),
        Err(AssessmentError::NotFound { entity: "module", .. })
    ));
}

#[test]
fn topic_access_upserts_one_record_and_accumulates_time() {
    let h = harness();
    let ada = learner();
    enroll(&h, &ada);
    let tracker = h.service.progress();

    tracker
        .record_topic_access(&ada, &course_id(), &topic(2), 120)
        .unwrap();
    let record = tracker
        .record_topic_access(&ada, &course_id(), &topic(2), 45)
        .unwrap();
    assert_eq!(record.time_spent_seconds, 165);
    assert_eq!(record.status, TopicStatus::InProgress);

    let records = h
        .store
        .topic_progress_for_course(&ada.user_id, &course_id())
        .unwrap();
    assert_eq!(records.len(), 1);

    let view = tracker.course_progress(&ada, &course_id()).unwrap();
    assert_eq!(view.last_accessed_topic, Some(topic(2)));
    assert_eq!(view.progress, 0);
}

#[test]
fn ratings_are_validated_and_recomputed() {
    let h = harness();
    let ada = learner();
    let linus = other_learner();
    enroll(&h, &ada);
    enroll(&h, &linus);
    let tracker = h.service.progress();

    assert!(matches!(
        tracker.rate_course(&ada, &course_id(), 6, None),
        Err(AssessmentError::ValidationError(_))
    ));
    assert!(matches!(
        tracker.rate_course(&ada, &course_id(), 0, None),
        Err(AssessmentError::ValidationError(_))
    ));

    tracker.rate_course(&ada, &course_id(), 5, None).unwrap();
    let summary = tracker
        .rate_course(&linus, &course_id(), 2, Some("Too fast".to_string()))
        .unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.average, 3.5);

    tracker.unenroll(&linus, &course_id()).unwrap();
    let after = tracker.course_rating(&course_id()).unwrap();
    assert_eq!((after.count, after.average), (1, 5.0));
}

#[test]
fn enrollment_lifecycle_rules() {
    let h = harness();
    let ada = learner();
    let tracker = h.service.progress();

    let first = tracker.enroll(&ada, &course_id()).unwrap();
    let again = tracker.enroll(&ada, &course_id()).unwrap();
    assert_eq!(first.enrolled_at, again.enrolled_at);

    assert!(matches!(
        tracker.set_enrollment_status(&ada, &course_id(), EnrollmentStatus::Completed),
        Err(AssessmentError::ValidationError(_))
    ));

    tracker
        .set_enrollment_status(&ada, &course_id(), EnrollmentStatus::Dropped)
        .unwrap();
    assert!(matches!(
        h.service.quizzes().start(&ada, &quiz_id()),
        Err(AssessmentError::Forbidden(_))
    ));

    let back = tracker.enroll(&ada, &course_id()).unwrap();
    assert_eq!(back.status, EnrollmentStatus::Active);

    assert!(matches!(
        tracker.unenroll(&other_learner(), &course_id()),
        Err(AssessmentError::NotFound { .. })
    ));
}
