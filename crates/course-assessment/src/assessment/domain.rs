use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Authenticated user (learner, grader or admin).
    UserId
);
string_id!(CourseId);
string_id!(ModuleId);
string_id!(TopicId);
string_id!(QuizId);
string_id!(QuestionId);
string_id!(AttemptId);
string_id!(AssignmentId);
string_id!(SubmissionId);
string_id!(
    /// Public, globally unique certificate code.
    CertificateCode
);

/// Course structure as authored in the catalog. Read-only to the engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub modules: Vec<CourseModule>,
}

impl Course {
    pub fn topic_count(&self) -> usize {
        self.modules.iter().map(|module| module.topics.len()).sum()
    }

    pub fn contains_topic(&self, topic_id: &TopicId) -> bool {
        self.modules
            .iter()
            .any(|module| module.topics.iter().any(|topic| &topic.id == topic_id))
    }

    pub fn module(&self, module_id: &ModuleId) -> Option<&CourseModule> {
        self.modules.iter().find(|module| &module.id == module_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: ModuleId,
    pub title: String,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
}

/// Question type together with its authoritative answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice {
        options: Vec<ChoiceOption>,
        correct: String,
    },
    MultipleChoice {
        options: Vec<ChoiceOption>,
        correct: Vec<String>,
    },
    TrueFalse {
        correct: bool,
    },
    ShortAnswer {
        accepted: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub points: f64,
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub course_id: CourseId,
    /// Passing the quiz completes this topic.
    #[serde(default)]
    pub topic_id: Option<TopicId>,
    pub title: String,
    pub questions: Vec<Question>,
    /// Zero means untimed.
    #[serde(default)]
    pub duration_minutes: u32,
    pub passing_score: f64,
    /// Zero means unlimited.
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(default)]
    pub show_answers: bool,
}

impl Quiz {
    pub fn total_points(&self) -> f64 {
        self.questions.iter().map(|question| question.points).sum()
    }

    pub fn question(&self, question_id: &QuestionId) -> Option<&Question> {
        self.questions
            .iter()
            .find(|question| &question.id == question_id)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.duration_minutes > 0).then(|| Duration::minutes(i64::from(self.duration_minutes)))
    }
}

/// Learner-supplied answer. Correctness is always derived server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerResponse {
    Choice { option_id: String },
    Choices { option_ids: Vec<String> },
    Boolean { value: bool },
    Text { value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: QuestionId,
    pub response: AnswerResponse,
    pub is_correct: bool,
    pub points_earned: f64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }
}

/// One learner's run through a quiz. Scoring fields are only meaningful
/// once `status` is `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: AttemptId,
    pub learner_id: UserId,
    pub quiz_id: QuizId,
    pub course_id: CourseId,
    pub attempt_number: u32,
    answers: Vec<AnsweredQuestion>,
    pub score: f64,
    pub percentage: f64,
    pub passed: bool,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: Option<i64>,
    /// Set when the attempt was closed because its time limit ran out.
    pub auto_submitted: bool,
    pub version: u64,
}

impl QuizAttempt {
    pub fn start(
        id: AttemptId,
        learner_id: UserId,
        quiz: &Quiz,
        attempt_number: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            learner_id,
            quiz_id: quiz.id.clone(),
            course_id: quiz.course_id.clone(),
            attempt_number,
            answers: Vec::new(),
            score: 0.0,
            percentage: 0.0,
            passed: false,
            status: AttemptStatus::InProgress,
            started_at,
            completed_at: None,
            elapsed_seconds: None,
            auto_submitted: false,
            version: 0,
        }
    }

    pub fn answers(&self) -> &[AnsweredQuestion] {
        &self.answers
    }

    pub fn has_answered(&self, question_id: &QuestionId) -> bool {
        self.answers
            .iter()
            .any(|answer| &answer.question_id == question_id)
    }

    /// Appends an answer; returns `false` if the question was already answered.
    pub fn append_answer(&mut self, answer: AnsweredQuestion) -> bool {
        if self.has_answered(&answer.question_id) {
            return false;
        }
        self.answers.push(answer);
        true
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn is_expired(&self, quiz: &Quiz, now: DateTime<Utc>) -> bool {
        self.is_in_progress()
            && quiz
                .time_limit()
                .is_some_and(|limit| now - self.started_at >= limit)
    }

    pub fn earned_points(&self) -> f64 {
        self.answers.iter().map(|answer| answer.points_earned).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatePolicy {
    pub allow_late: bool,
    /// Percentage deducted per started day past the due date.
    pub penalty_per_day: f64,
}

impl Default for LatePolicy {
    fn default() -> Self {
        Self {
            allow_late: false,
            penalty_per_day: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub criterion: String,
    pub max_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub expected_output: String,
    pub points: f64,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub course_id: CourseId,
    pub title: String,
    pub total_points: f64,
    pub passing_score: f64,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub late_policy: LatePolicy,
    /// Zero means unlimited.
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub rubric: Vec<RubricCriterion>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub auto_grade: bool,
}

impl Assignment {
    /// Rubric total when a rubric exists, the authored total otherwise.
    pub fn effective_total_points(&self) -> f64 {
        if self.rubric.is_empty() {
            self.total_points
        } else {
            self.rubric.iter().map(|criterion| criterion.max_points).sum()
        }
    }

    pub fn is_auto_gradable(&self) -> bool {
        self.auto_grade && !self.test_cases.is_empty()
    }

    pub fn criterion(&self, name: &str) -> Option<&RubricCriterion> {
        self.rubric
            .iter()
            .find(|criterion| criterion.criterion == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedFile {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub files: Vec<SubmittedFile>,
}

impl SubmissionContent {
    pub fn is_empty(&self) -> bool {
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());
        blank(&self.text) && blank(&self.code) && self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Grading,
    Graded,
    Returned,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Grading => "grading",
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::Returned => "returned",
        }
    }

    pub fn awaiting_grade(self) -> bool {
        matches!(self, SubmissionStatus::Submitted | SubmissionStatus::Grading)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    pub criterion: String,
    pub points: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub name: String,
    pub passed: bool,
    pub points_awarded: f64,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSubmission {
    pub id: SubmissionId,
    pub learner_id: UserId,
    pub assignment_id: AssignmentId,
    pub course_id: CourseId,
    pub attempt_number: u32,
    pub content: SubmissionContent,
    pub submitted_at: DateTime<Utc>,
    pub is_late: bool,
    pub days_late: u32,
    pub late_penalty: f64,
    pub status: SubmissionStatus,
    pub raw_score: Option<f64>,
    pub rubric_scores: Vec<RubricScore>,
    pub final_score: Option<f64>,
    pub passed: Option<bool>,
    pub graded_by: Option<UserId>,
    pub graded_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
    pub test_results: Vec<TestCaseResult>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Paused,
    Dropped,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Paused => "paused",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub learner_id: UserId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub progress: u8,
    completed_topics: Vec<TopicId>,
    pub last_accessed_topic: Option<TopicId>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
    pub review: Option<String>,
    pub version: u64,
}

impl Enrollment {
    pub fn new(learner_id: UserId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            status: EnrollmentStatus::Active,
            progress: 0,
            completed_topics: Vec::new(),
            last_accessed_topic: None,
            last_accessed_at: None,
            enrolled_at,
            completed_at: None,
            rating: None,
            review: None,
            version: 0,
        }
    }

    /// Completed topics in completion order, without duplicates.
    pub fn completed_topics(&self) -> &[TopicId] {
        &self.completed_topics
    }

    pub fn has_completed(&self, topic_id: &TopicId) -> bool {
        self.completed_topics.contains(topic_id)
    }

    /// Set-add; returns `false` if the topic was already recorded.
    pub fn mark_topic_completed(&mut self, topic_id: TopicId) -> bool {
        if self.has_completed(&topic_id) {
            return false;
        }
        self.completed_topics.push(topic_id);
        true
    }

    pub fn grants_access(&self) -> bool {
        self.status != EnrollmentStatus::Dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProgress {
    pub learner_id: UserId,
    pub course_id: CourseId,
    pub topic_id: TopicId,
    pub status: TopicStatus,
    pub time_spent_seconds: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub version: u64,
}

impl TopicProgress {
    pub fn new(learner_id: UserId, course_id: CourseId, topic_id: TopicId) -> Self {
        Self {
            learner_id,
            course_id,
            topic_id,
            status: TopicStatus::NotStarted,
            time_spent_seconds: 0,
            last_accessed_at: None,
            completed_at: None,
            notes: None,
            version: 0,
        }
    }
}

/// Snapshot of the learner's record at issuance time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub modules: usize,
    pub topics: usize,
    pub quizzes_completed: usize,
    pub assignments_graded: usize,
    pub average_quiz_score: f64,
    pub average_assignment_score: f64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub code: CertificateCode,
    pub learner_id: UserId,
    pub holder_name: String,
    pub course_id: CourseId,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub final_score: f64,
    pub grade: String,
    pub revoked: bool,
    pub revoked_reason: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub metadata: CertificateMetadata,
    pub version: u64,
}

impl Certificate {
    pub fn is_active(&self) -> bool {
        !self.revoked
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Aggregate of learner ratings for a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRating {
    pub course_id: CourseId,
    pub average: f64,
    pub count: u32,
    #[serde(default)]
    pub version: u64,
}
