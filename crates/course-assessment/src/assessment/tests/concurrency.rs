use super::common::*;
use std::sync::Barrier;
use std::thread;

use crate::assessment::assignments::GradeInput;
use crate::assessment::domain::{AnswerResponse, EnrollmentStatus, QuestionId, SubmissionContent};
use crate::assessment::notifications::NotificationEvent;
use crate::assessment::AssessmentError;
use crate::auth::Principal;

const THREADS: usize = 8;

/// Runs `work` on `THREADS` threads released together by a barrier.
fn race<T: Send>(work: impl Fn(usize) -> T + Sync) -> Vec<T> {
    let barrier = Barrier::new(THREADS);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|index| {
                let barrier = &barrier;
                let work = &work;
                scope.spawn(move || {
                    barrier.wait();
                    work(index)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    })
}

#[test]
fn racing_ratings_leave_the_aggregate_current() {
    let h = contended_harness();
    let raters: Vec<_> = (0..THREADS)
        .map(|index| Principal::learner(format!("rater-{index}"), format!("Rater {index}")))
        .collect();
    for rater in &raters {
        enroll(&h, rater);
    }

    let results = race(|index| {
        let stars = if index % 2 == 0 { 5 } else { 2 };
        h.service.progress().rate_course(&raters[index], &course_id(), stars, None)
    });
    assert!(results.iter().all(Result::is_ok));

    let summary = h.service.progress().course_rating(&course_id()).unwrap();
    assert_eq!(summary.count, THREADS as u32);
    assert_eq!(summary.average, 3.5);
}

#[test]
fn racing_starts_open_exactly_one_attempt() {
    let h = contended_harness();
    let ada = learner();
    enroll(&h, &ada);

    let results = race(|_| h.service.quizzes().start(&ada, &quiz_id()));
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(err) = result {
            match err {
                AssessmentError::AttemptAlreadyActive { attempt_id } => {
                    assert_eq!(attempt_id, &winners[0].id)
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    let history = h.service.quizzes().list_attempts(&ada, &quiz_id()).unwrap();
    assert_eq!(history.used, 1);
}

#[test]
fn racing_answers_to_one_question_record_it_once() {
    let h = contended_harness();
    let ada = learner();
    enroll(&h, &ada);
    let attempt = h.service.quizzes().start(&ada, &quiz_id()).unwrap();

    let results = race(|_| {
        h.service.quizzes().submit_answer(
            &ada,
            &attempt.id,
            &QuestionId::new("q2"),
            AnswerResponse::Boolean { value: false },
        )
    });
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, AssessmentError::DuplicateAnswer { .. })));

    let stored = h.service.quizzes().get_attempt(&ada, &attempt.id).unwrap();
    assert_eq!(stored.answers().len(), 1);
}

#[test]
fn racing_topic_completions_all_land() {
    let h = contended_harness();
    let ada = learner();
    enroll(&h, &ada);

    let results = race(|index| {
        h.service
            .progress()
            .complete_topic(&ada, &course_id(), &topic(index + 1))
    });
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(
        results
            .iter()
            .filter(|r| r.as_ref().is_ok_and(|update| update.course_completed))
            .count(),
        1
    );

    let view = h.service.progress().course_progress(&ada, &course_id()).unwrap();
    assert_eq!(view.progress, 100);
    assert_eq!(view.completed_topics.len(), 8);
    assert_eq!(view.status, EnrollmentStatus::Completed);
    assert_eq!(h.events(NotificationEvent::CourseCompleted).len(), 1);
}

#[test]
fn racing_graders_grade_once() {
    let h = contended_harness();
    let ada = learner();
    enroll(&h, &ada);
    let submission = h
        .service
        .assignments()
        .submit(
            &ada,
            &essay_id(),
            SubmissionContent {
                text: Some("Shared xor mutable.".to_string()),
                ..SubmissionContent::default()
            },
        )
        .unwrap();

    let results = race(|index| {
        h.service.assignments().grade(
            &grader(),
            &submission.id,
            GradeInput {
                raw_score: Some(70.0 + index as f64),
                ..GradeInput::default()
            },
        )
    });
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, AssessmentError::AlreadyGraded { .. })));
    assert_eq!(h.events(NotificationEvent::SubmissionGraded).len(), 1);
}

#[test]
fn racing_certificate_requests_issue_once() {
    let h = contended_harness();
    let ada = learner();
    enroll(&h, &ada);
    complete_course(&h, &ada);

    let results = race(|_| h.service.certificates().request(&ada, &course_id()));
    let issued: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(issued.len(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        match err {
            AssessmentError::AlreadyIssued { certificate_code } => {
                assert_eq!(certificate_code, &issued[0].code)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(
        h.service.certificates().list_for_learner(&ada).unwrap().len(),
        1
    );
}
