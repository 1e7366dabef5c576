use std::collections::BTreeSet;

use super::super::domain::{AnswerResponse, Question, QuestionKind, Quiz, QuizAttempt};
use super::super::error::AssessmentError;
use super::super::scoring;

/// Terminal scoring of an attempt against the quiz's point total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptScore {
    pub score: f64,
    pub percentage: f64,
    pub passed: bool,
}

pub(crate) fn score_attempt(attempt: &QuizAttempt, quiz: &Quiz) -> AttemptScore {
    let score = attempt.earned_points();
    let percentage = scoring::percentage(score, quiz.total_points());
    AttemptScore {
        score,
        percentage,
        passed: scoring::passed(percentage, quiz.passing_score),
    }
}

/// Checks a response against the authoritative key. A response of the
/// wrong shape for the question is a validation error, not a wrong answer.
pub(crate) fn evaluate_answer(
    question: &Question,
    response: &AnswerResponse,
) -> Result<bool, AssessmentError> {
    match (&question.kind, response) {
        (QuestionKind::SingleChoice { correct, .. }, AnswerResponse::Choice { option_id }) => {
            Ok(option_id == correct)
        }
        (QuestionKind::SingleChoice { correct, .. }, AnswerResponse::Choices { option_ids }) => {
            Ok(option_ids.len() == 1 && &option_ids[0] == correct)
        }
        (
            QuestionKind::MultipleChoice { correct, .. },
            AnswerResponse::Choices { option_ids },
        ) => {
            let expected: BTreeSet<&str> = correct.iter().map(String::as_str).collect();
            let given: BTreeSet<&str> = option_ids.iter().map(String::as_str).collect();
            Ok(expected == given)
        }
        (QuestionKind::MultipleChoice { correct, .. }, AnswerResponse::Choice { option_id }) => {
            Ok(correct.len() == 1 && &correct[0] == option_id)
        }
        (QuestionKind::TrueFalse { correct }, AnswerResponse::Boolean { value }) => {
            Ok(value == correct)
        }
        (
            QuestionKind::ShortAnswer {
                accepted,
                case_sensitive,
            },
            AnswerResponse::Text { value },
        ) => {
            let given = value.trim();
            Ok(accepted.iter().any(|candidate| {
                let candidate = candidate.trim();
                if *case_sensitive {
                    candidate == given
                } else {
                    candidate.eq_ignore_ascii_case(given)
                        || candidate.to_lowercase() == given.to_lowercase()
                }
            }))
        }
        _ => Err(AssessmentError::ValidationError(format!(
            "response type does not match question '{}'",
            question.id
        ))),
    }
}
