use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::assessment::domain::{
    Assignment, AssignmentId, ChoiceOption, Course, CourseId, CourseModule, LatePolicy, ModuleId,
    Question, QuestionId, QuestionKind, Quiz, QuizId, Topic, TopicId,
};
use crate::assessment::notifications::{
    MemoryNotifier, Notification, NotificationEvent, Notifier, NotifyError,
};
use crate::assessment::{AssessmentService, MemoryStore};
use crate::auth::{Principal, Role, StaticTokenAuthenticator};
use crate::clock::ManualClock;
use crate::config::AssessmentConfig;

pub(super) const COURSE: &str = "rust-101";
pub(super) const QUIZ: &str = "ownership-quiz";
pub(super) const ESSAY: &str = "borrow-essay";

pub(super) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

pub(super) fn course_id() -> CourseId {
    CourseId::new(COURSE)
}

pub(super) fn quiz_id() -> QuizId {
    QuizId::new(QUIZ)
}

pub(super) fn essay_id() -> AssignmentId {
    AssignmentId::new(ESSAY)
}

pub(super) fn topic(n: usize) -> TopicId {
    TopicId::new(format!("t{n}"))
}

/// Eight topics split over two modules of four.
pub(super) fn course() -> Course {
    let module = |index: usize, range: std::ops::RangeInclusive<usize>| CourseModule {
        id: ModuleId::new(format!("m{index}")),
        title: format!("Module {index}"),
        topics: range
            .map(|n| Topic {
                id: topic(n),
                title: format!("Topic {n}"),
            })
            .collect(),
    };
    Course {
        id: course_id(),
        title: "Rust Fundamentals".to_string(),
        modules: vec![module(1, 1..=4), module(2, 5..=8)],
    }
}

/// Two questions worth five points each, 60% to pass, 30 minutes, three
/// attempts. Passing completes topic t1.
pub(super) fn quiz() -> Quiz {
    Quiz {
        id: quiz_id(),
        course_id: course_id(),
        topic_id: Some(topic(1)),
        title: "Ownership".to_string(),
        questions: vec![
            Question {
                id: QuestionId::new("q1"),
                prompt: "Which keyword transfers ownership into a closure?".to_string(),
                points: 5.0,
                kind: QuestionKind::SingleChoice {
                    options: vec![
                        ChoiceOption {
                            id: "a".to_string(),
                            text: "ref".to_string(),
                        },
                        ChoiceOption {
                            id: "b".to_string(),
                            text: "move".to_string(),
                        },
                        ChoiceOption {
                            id: "c".to_string(),
                            text: "static".to_string(),
                        },
                    ],
                    correct: "b".to_string(),
                },
            },
            Question {
                id: QuestionId::new("q2"),
                prompt: "A moved-from binding can still be read.".to_string(),
                points: 5.0,
                kind: QuestionKind::TrueFalse { correct: false },
            },
        ],
        duration_minutes: 30,
        passing_score: 60.0,
        max_attempts: 3,
        shuffle_questions: true,
        shuffle_options: true,
        show_answers: true,
    }
}

/// 100 points, 70% to pass, due a week after `epoch`, late work allowed at
/// 10% per day, two attempts.
pub(super) fn essay() -> Assignment {
    Assignment {
        id: essay_id(),
        course_id: course_id(),
        title: "Explain the borrow checker".to_string(),
        total_points: 100.0,
        passing_score: 70.0,
        due_date: Some(epoch() + Duration::days(7)),
        late_policy: LatePolicy {
            allow_late: true,
            penalty_per_day: 10.0,
        },
        max_attempts: 2,
        rubric: Vec::new(),
        test_cases: Vec::new(),
        auto_grade: false,
    }
}

pub(super) fn learner() -> Principal {
    Principal::learner("ada", "Ada Lovelace")
}

pub(super) fn other_learner() -> Principal {
    Principal::learner("linus", "Linus Torvalds")
}

pub(super) fn grader() -> Principal {
    Principal::with_role("grace", "Grace Hopper", Role::Grader)
}

pub(super) fn admin() -> Principal {
    Principal::with_role("root", "Registrar", Role::Admin)
}

pub(super) fn authenticator() -> StaticTokenAuthenticator {
    StaticTokenAuthenticator::new([
        ("t-ada".to_string(), learner()),
        ("t-linus".to_string(), other_learner()),
        ("t-grace".to_string(), grader()),
        ("t-root".to_string(), admin()),
    ])
}

pub(super) struct Harness<N = MemoryNotifier> {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<N>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<AssessmentService<MemoryStore, N>>,
}

impl Harness {
    pub(super) fn events(&self, event: NotificationEvent) -> Vec<Notification> {
        self.notifier
            .events()
            .into_iter()
            .filter(|notification| notification.event == event)
            .collect()
    }
}

pub(super) fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    store.seed_course(course());
    store.seed_quiz(quiz());
    store.seed_assignment(essay());
    store
}

pub(super) fn harness_with_config(config: AssessmentConfig) -> Harness {
    harness_from(seeded_store(), MemoryNotifier::default(), config)
}

pub(super) fn harness() -> Harness {
    harness_with_config(AssessmentConfig::default())
}

pub(super) fn harness_from<N: Notifier + 'static>(
    store: MemoryStore,
    notifier: N,
    config: AssessmentConfig,
) -> Harness<N> {
    let store = Arc::new(store);
    let notifier = Arc::new(notifier);
    let clock = Arc::new(ManualClock::new(epoch()));
    let service = Arc::new(AssessmentService::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        config,
    ));
    Harness {
        store,
        notifier,
        clock,
        service,
    }
}

/// Harness tuned for many threads contending on one learner's records.
pub(super) fn contended_harness() -> Harness {
    harness_with_config(AssessmentConfig {
        write_retries: 64,
        ..AssessmentConfig::default()
    })
}

pub(super) fn enroll<N: Notifier + 'static>(harness: &Harness<N>, principal: &Principal) {
    harness
        .service
        .progress()
        .enroll(principal, &course_id())
        .expect("enrollment succeeds");
}

pub(super) fn complete_course<N: Notifier + 'static>(harness: &Harness<N>, principal: &Principal) {
    for n in 1..=8 {
        harness
            .service
            .progress()
            .complete_topic(principal, &course_id(), &topic(n))
            .expect("topic completes");
    }
}

/// Notifier whose transport is always down.
#[derive(Debug, Default)]
pub(super) struct OfflineNotifier;

impl Notifier for OfflineNotifier {
    fn publish(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay unreachable".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("json body")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}
