use chrono::{DateTime, Duration, Utc};
use course_assessment::assessment::domain::{
    ChoiceOption, LatePolicy, QuestionKind, RubricCriterion, Topic,
};
use course_assessment::assessment::{
    Assignment, AssignmentId, Course, CourseId, CourseModule, MemoryStore, ModuleId, Question,
    QuestionId, Quiz, QuizId, TopicId,
};
use course_assessment::auth::{Principal, Role, StaticTokenAuthenticator};
use course_assessment::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) const DEMO_COURSE: &str = "rust-101";
pub(crate) const OWNERSHIP_QUIZ: &str = "ownership-quiz";
pub(crate) const TRAITS_QUIZ: &str = "traits-quiz";
pub(crate) const BORROW_ESSAY: &str = "borrow-essay";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Bearer token entry in the seed file; the principal fields sit beside the token.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeedToken {
    pub(crate) token: String,
    #[serde(flatten)]
    pub(crate) principal: Principal,
}

/// Catalog plus token table loaded at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Seed {
    #[serde(default)]
    pub(crate) courses: Vec<Course>,
    #[serde(default)]
    pub(crate) quizzes: Vec<Quiz>,
    #[serde(default)]
    pub(crate) assignments: Vec<Assignment>,
    #[serde(default)]
    pub(crate) tokens: Vec<SeedToken>,
}

impl Seed {
    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(crate) fn into_parts(self) -> (MemoryStore, StaticTokenAuthenticator) {
        let store = MemoryStore::default();
        for course in self.courses {
            store.seed_course(course);
        }
        for quiz in self.quizzes {
            store.seed_quiz(quiz);
        }
        for assignment in self.assignments {
            store.seed_assignment(assignment);
        }
        let authenticator = StaticTokenAuthenticator::new(
            self.tokens
                .into_iter()
                .map(|entry| (entry.token, entry.principal)),
        );
        (store, authenticator)
    }
}

pub(crate) fn demo_learner() -> Principal {
    Principal::learner("ada", "Ada Lovelace")
}

pub(crate) fn demo_peer() -> Principal {
    Principal::learner("linus", "Linus Torvalds")
}

pub(crate) fn demo_graduate() -> Principal {
    Principal::learner("mara", "Mara Jade")
}

pub(crate) fn demo_grader() -> Principal {
    Principal::with_role("grace", "Grace Hopper", Role::Grader)
}

pub(crate) fn demo_admin() -> Principal {
    Principal::with_role("root", "Registrar", Role::Admin)
}

fn choice(id: &str, text: &str) -> ChoiceOption {
    ChoiceOption {
        id: id.to_string(),
        text: text.to_string(),
    }
}

fn true_false(id: &str, prompt: &str, points: f64, correct: bool) -> Question {
    Question {
        id: QuestionId::new(id),
        prompt: prompt.to_string(),
        points,
        kind: QuestionKind::TrueFalse { correct },
    }
}

fn demo_course() -> Course {
    let module = |index: usize, titles: [&str; 4]| CourseModule {
        id: ModuleId::new(format!("m{index}")),
        title: format!("Module {index}"),
        topics: titles
            .iter()
            .enumerate()
            .map(|(offset, title)| Topic {
                id: TopicId::new(format!("t{}", (index - 1) * 4 + offset + 1)),
                title: (*title).to_string(),
            })
            .collect(),
    };
    Course {
        id: CourseId::new(DEMO_COURSE),
        title: "Rust Fundamentals".to_string(),
        modules: vec![
            module(1, ["Ownership", "Borrowing", "Lifetimes", "Slices"]),
            module(2, ["Traits", "Generics", "Iterators", "Closures"]),
        ],
    }
}

fn ownership_quiz() -> Quiz {
    Quiz {
        id: QuizId::new(OWNERSHIP_QUIZ),
        course_id: CourseId::new(DEMO_COURSE),
        topic_id: Some(TopicId::new("t1")),
        title: "Ownership".to_string(),
        questions: vec![
            Question {
                id: QuestionId::new("q1"),
                prompt: "Which keyword transfers ownership into a closure?".to_string(),
                points: 5.0,
                kind: QuestionKind::SingleChoice {
                    options: vec![choice("a", "ref"), choice("b", "move"), choice("c", "static")],
                    correct: "b".to_string(),
                },
            },
            true_false("q2", "A moved-from binding can still be read.", 5.0, false),
        ],
        duration_minutes: 30,
        passing_score: 60.0,
        max_attempts: 3,
        shuffle_questions: true,
        shuffle_options: true,
        show_answers: true,
    }
}

fn traits_quiz() -> Quiz {
    Quiz {
        id: QuizId::new(TRAITS_QUIZ),
        course_id: CourseId::new(DEMO_COURSE),
        topic_id: None,
        title: "Traits".to_string(),
        questions: vec![
            true_false("tq1", "Traits can provide default method bodies.", 2.0, true),
            true_false("tq2", "A trait object requires a sized receiver type.", 2.0, false),
            true_false("tq3", "Generic functions are monomorphized.", 2.0, true),
            true_false("tq4", "Orphan rules allow implementing Display for Vec<T>.", 2.0, false),
            true_false("tq5", "Associated types are fixed per implementation.", 2.0, true),
        ],
        duration_minutes: 20,
        passing_score: 60.0,
        max_attempts: 0,
        shuffle_questions: false,
        shuffle_options: false,
        show_answers: false,
    }
}

fn borrow_essay(start: DateTime<Utc>) -> Assignment {
    Assignment {
        id: AssignmentId::new(BORROW_ESSAY),
        course_id: CourseId::new(DEMO_COURSE),
        title: "Explain the borrow checker".to_string(),
        total_points: 100.0,
        passing_score: 70.0,
        due_date: Some(start + Duration::days(7)),
        late_policy: LatePolicy {
            allow_late: true,
            penalty_per_day: 10.0,
        },
        max_attempts: 2,
        rubric: vec![
            RubricCriterion {
                criterion: "accuracy".to_string(),
                max_points: 60.0,
            },
            RubricCriterion {
                criterion: "clarity".to_string(),
                max_points: 40.0,
            },
        ],
        test_cases: Vec::new(),
        auto_grade: false,
    }
}

/// Demo catalog and tokens, with the essay due a week after `start`.
pub(crate) fn demo_seed(start: DateTime<Utc>) -> Seed {
    let token = |token: &str, principal: Principal| SeedToken {
        token: token.to_string(),
        principal,
    };
    Seed {
        courses: vec![demo_course()],
        quizzes: vec![ownership_quiz(), traits_quiz()],
        assignments: vec![borrow_essay(start)],
        tokens: vec![
            token("demo-ada", demo_learner()),
            token("demo-linus", demo_peer()),
            token("demo-mara", demo_graduate()),
            token("demo-grace", demo_grader()),
            token("demo-root", demo_admin()),
        ],
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
