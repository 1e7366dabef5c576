use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use uuid::Uuid;

use super::super::domain::{
    AttemptId, ChoiceOption, QuestionId, QuestionKind, Quiz, QuizAttempt, QuizId,
};

/// Question as shown to the learner; answer keys are stripped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentedKind {
    SingleChoice { options: Vec<ChoiceOption> },
    MultipleChoice { options: Vec<ChoiceOption> },
    TrueFalse,
    ShortAnswer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentedQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub points: f64,
    pub kind: PresentedKind,
    pub answered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizPresentation {
    pub attempt_id: AttemptId,
    pub quiz_id: QuizId,
    pub title: String,
    pub total_points: f64,
    pub passing_score: f64,
    pub expires_at: Option<DateTime<Utc>>,
    pub questions: Vec<PresentedQuestion>,
}

/// Seeded from a name-based uuid of the attempt id, so an attempt always sees the same order.
fn rng_for(attempt_id: &AttemptId) -> StdRng {
    let name = Uuid::new_v5(&Uuid::NAMESPACE_OID, attempt_id.as_str().as_bytes());
    let (high, low) = name.as_u64_pair();
    StdRng::seed_from_u64(high ^ low)
}

/// Presentation only: ordering never feeds into scoring, which looks
/// questions and options up by id.
pub(crate) fn present(quiz: &Quiz, attempt: &QuizAttempt) -> QuizPresentation {
    let mut rng = rng_for(&attempt.id);

    let mut questions: Vec<PresentedQuestion> = quiz
        .questions
        .iter()
        .map(|question| {
            let mut shuffle = |options: &[ChoiceOption]| {
                let mut options = options.to_vec();
                if quiz.shuffle_options {
                    options.shuffle(&mut rng);
                }
                options
            };
            let kind = match &question.kind {
                QuestionKind::SingleChoice { options, .. } => PresentedKind::SingleChoice {
                    options: shuffle(options),
                },
                QuestionKind::MultipleChoice { options, .. } => PresentedKind::MultipleChoice {
                    options: shuffle(options),
                },
                QuestionKind::TrueFalse { .. } => PresentedKind::TrueFalse,
                QuestionKind::ShortAnswer { .. } => PresentedKind::ShortAnswer,
            };
            PresentedQuestion {
                id: question.id.clone(),
                prompt: question.prompt.clone(),
                points: question.points,
                kind,
                answered: attempt.has_answered(&question.id),
            }
        })
        .collect();

    if quiz.shuffle_questions {
        questions.shuffle(&mut rng);
    }

    QuizPresentation {
        attempt_id: attempt.id.clone(),
        quiz_id: quiz.id.clone(),
        title: quiz.title.clone(),
        total_points: quiz.total_points(),
        passing_score: quiz.passing_score,
        expires_at: quiz.time_limit().map(|limit| attempt.started_at + limit),
        questions,
    }
}
