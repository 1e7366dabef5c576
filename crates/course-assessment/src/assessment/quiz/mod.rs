//! Quiz attempt lifecycle: start, answer, complete or abandon.

mod evaluation;
mod presentation;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    AnswerResponse, AnsweredQuestion, AttemptId, AttemptStatus, QuestionId, Quiz, QuizAttempt,
    QuizId,
};
use super::error::AssessmentError;
use super::guard::{require_enrollment, retry_on_contention};
use super::notifications::{dispatch, Notification, NotificationEvent, Notifier};
use super::progress::{ProgressTracker, ProgressUpdate};
use super::repository::AssessmentStore;
use crate::auth::Principal;
use crate::clock::Clock;

pub use evaluation::AttemptScore;
pub use presentation::{PresentedKind, PresentedQuestion, QuizPresentation};

pub(crate) use evaluation::{evaluate_answer, score_attempt};

/// Acknowledgement for a submitted answer. Correctness is only revealed
/// when the quiz is configured to show answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerReceipt {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub answered: usize,
    pub total_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub attempt: QuizAttempt,
    /// Present when passing the quiz completed its topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptHistory {
    pub quiz_id: QuizId,
    pub max_attempts: u32,
    pub used: u32,
    /// `None` when the quiz allows unlimited attempts.
    pub remaining: Option<u32>,
    pub attempts: Vec<QuizAttempt>,
}

fn next_attempt_id() -> AttemptId {
    AttemptId(format!("att-{}", Uuid::new_v4().simple()))
}

/// Attempts still allowed after `used`, or `None` when unlimited.
pub fn remaining_attempts(max_attempts: u32, used: u32) -> Option<u32> {
    (max_attempts > 0).then(|| max_attempts.saturating_sub(used))
}

enum AnswerStep {
    Recorded(QuizAttempt, AnsweredQuestion),
    Expired(QuizAttempt),
}

/// Owns the attempt state machine and applies scoring at completion.
pub struct QuizAttemptEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    progress: Arc<ProgressTracker<S, N>>,
    write_retries: u32,
}

impl<S, N> QuizAttemptEngine<S, N>
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        progress: Arc<ProgressTracker<S, N>>,
        write_retries: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            progress,
            write_retries,
        }
    }

    fn quiz(&self, quiz_id: &QuizId) -> Result<Quiz, AssessmentError> {
        self.store
            .quiz(quiz_id)?
            .ok_or_else(|| AssessmentError::not_found("quiz", quiz_id))
    }

    fn attempt(&self, attempt_id: &AttemptId) -> Result<QuizAttempt, AssessmentError> {
        self.store
            .fetch_attempt(attempt_id)?
            .ok_or_else(|| AssessmentError::not_found("attempt", attempt_id))
    }

    fn owned_attempt(
        &self,
        principal: &Principal,
        attempt_id: &AttemptId,
    ) -> Result<QuizAttempt, AssessmentError> {
        let attempt = self.attempt(attempt_id)?;
        if attempt.learner_id != principal.user_id {
            return Err(AssessmentError::Forbidden(format!(
                "attempt '{attempt_id}' belongs to another learner"
            )));
        }
        Ok(attempt)
    }

    /// Opens a new attempt. The active-attempt and attempt-number
    /// constraints are enforced by the store at insert time, so two racing
    /// starts resolve to one attempt and one `AttemptAlreadyActive`.
    pub fn start(
        &self,
        principal: &Principal,
        quiz_id: &QuizId,
    ) -> Result<QuizAttempt, AssessmentError> {
        let quiz = self.quiz(quiz_id)?;
        let learner_id = &principal.user_id;
        require_enrollment(self.store.as_ref(), learner_id, &quiz.course_id)?;
        self.expire_overdue(principal, &quiz)?;

        let attempt = retry_on_contention(self.write_retries, "start_attempt", || {
            let attempts = self.store.attempts_for(learner_id, quiz_id)?;
            if let Some(active) = attempts.iter().find(|attempt| attempt.is_in_progress()) {
                return Err(AssessmentError::AttemptAlreadyActive {
                    attempt_id: active.id.clone(),
                });
            }

            let used = u32::try_from(attempts.len()).unwrap_or(u32::MAX);
            if quiz.max_attempts > 0 && used >= quiz.max_attempts {
                return Err(AssessmentError::AttemptLimitExceeded {
                    max_attempts: quiz.max_attempts,
                    used,
                });
            }

            let attempt = QuizAttempt::start(
                next_attempt_id(),
                learner_id.clone(),
                &quiz,
                used + 1,
                self.clock.now(),
            );
            Ok(self.store.insert_attempt(attempt)?)
        })?;

        info!(
            learner = %learner_id,
            quiz = %quiz_id,
            attempt = %attempt.id,
            attempt_number = attempt.attempt_number,
            "quiz attempt started"
        );
        Ok(attempt)
    }

    /// Evaluates the response against the quiz's answer key and appends it.
    pub fn submit_answer(
        &self,
        principal: &Principal,
        attempt_id: &AttemptId,
        question_id: &QuestionId,
        response: AnswerResponse,
    ) -> Result<AnswerReceipt, AssessmentError> {
        let step = retry_on_contention(self.write_retries, "submit_answer", || {
            let mut attempt = self.owned_attempt(principal, attempt_id)?;
            let quiz = self.quiz(&attempt.quiz_id)?;
            if !attempt.is_in_progress() {
                return Err(AssessmentError::AttemptNotActive {
                    attempt_id: attempt.id,
                    status: attempt.status,
                });
            }

            let now = self.clock.now();
            if attempt.is_expired(&quiz, now) {
                let closed = self.finalize(attempt, &quiz, now, true)?;
                return Ok(AnswerStep::Expired(closed));
            }

            let question = quiz
                .question(question_id)
                .ok_or_else(|| AssessmentError::not_found("question", question_id))?;
            if attempt.has_answered(question_id) {
                return Err(AssessmentError::DuplicateAnswer {
                    question_id: question_id.clone(),
                });
            }

            let is_correct = evaluate_answer(question, &response)?;
            let answer = AnsweredQuestion {
                question_id: question_id.clone(),
                response: response.clone(),
                is_correct,
                points_earned: if is_correct { question.points } else { 0.0 },
                answered_at: now,
            };
            attempt.append_answer(answer.clone());
            let stored = self.store.update_attempt(attempt)?;
            Ok(AnswerStep::Recorded(stored, answer))
        })?;

        match step {
            AnswerStep::Expired(closed) => {
                let quiz = self.quiz(&closed.quiz_id)?;
                self.after_completion(&closed, &quiz);
                Err(AssessmentError::AttemptNotActive {
                    attempt_id: closed.id,
                    status: closed.status,
                })
            }
            AnswerStep::Recorded(attempt, answer) => {
                let quiz = self.quiz(&attempt.quiz_id)?;
                info!(
                    learner = %attempt.learner_id,
                    attempt = %attempt.id,
                    question = %answer.question_id,
                    "quiz answer recorded"
                );
                Ok(AnswerReceipt {
                    attempt_id: attempt.id.clone(),
                    question_id: answer.question_id,
                    answered: attempt.answers().len(),
                    total_questions: quiz.questions.len(),
                    is_correct: quiz.show_answers.then_some(answer.is_correct),
                    points_earned: quiz.show_answers.then_some(answer.points_earned),
                })
            }
        }
    }

    /// Terminal scoring. A second call fails with `AttemptNotActive`
    /// instead of re-scoring.
    pub fn complete(
        &self,
        principal: &Principal,
        attempt_id: &AttemptId,
    ) -> Result<CompletionOutcome, AssessmentError> {
        let (attempt, quiz) = retry_on_contention(self.write_retries, "complete_attempt", || {
            let attempt = self.owned_attempt(principal, attempt_id)?;
            if !attempt.is_in_progress() {
                return Err(AssessmentError::AttemptNotActive {
                    attempt_id: attempt.id,
                    status: attempt.status,
                });
            }
            let quiz = self.quiz(&attempt.quiz_id)?;
            let now = self.clock.now();
            let overdue = attempt.is_expired(&quiz, now);
            let closed = self.finalize(attempt, &quiz, now, overdue)?;
            Ok((closed, quiz))
        })?;

        let progress = self.after_completion(&attempt, &quiz);
        Ok(CompletionOutcome { attempt, progress })
    }

    pub fn abandon(
        &self,
        principal: &Principal,
        attempt_id: &AttemptId,
    ) -> Result<QuizAttempt, AssessmentError> {
        let attempt = retry_on_contention(self.write_retries, "abandon_attempt", || {
            let mut attempt = self.owned_attempt(principal, attempt_id)?;
            if !attempt.is_in_progress() {
                return Err(AssessmentError::AttemptNotActive {
                    attempt_id: attempt.id,
                    status: attempt.status,
                });
            }
            let now = self.clock.now();
            attempt.status = AttemptStatus::Abandoned;
            attempt.elapsed_seconds = Some(elapsed_seconds(attempt.started_at, now));
            Ok(self.store.update_attempt(attempt)?)
        })?;

        info!(
            learner = %attempt.learner_id,
            quiz = %attempt.quiz_id,
            attempt = %attempt.id,
            "quiz attempt abandoned"
        );
        Ok(attempt)
    }

    /// Owner or grader view of an attempt. An overdue attempt is closed
    /// before it is returned.
    pub fn get_attempt(
        &self,
        principal: &Principal,
        attempt_id: &AttemptId,
    ) -> Result<QuizAttempt, AssessmentError> {
        let attempt = self.attempt(attempt_id)?;
        if attempt.learner_id != principal.user_id && !principal.can_grade() {
            return Err(AssessmentError::Forbidden(format!(
                "attempt '{attempt_id}' belongs to another learner"
            )));
        }
        let quiz = self.quiz(&attempt.quiz_id)?;
        if attempt.is_expired(&quiz, self.clock.now()) {
            if let Some(closed) = self.force_complete(attempt_id, &quiz)? {
                return Ok(closed);
            }
            return self.attempt(attempt_id);
        }
        Ok(attempt)
    }

    pub fn list_attempts(
        &self,
        principal: &Principal,
        quiz_id: &QuizId,
    ) -> Result<AttemptHistory, AssessmentError> {
        let quiz = self.quiz(quiz_id)?;
        self.expire_overdue(principal, &quiz)?;
        let attempts = self.store.attempts_for(&principal.user_id, quiz_id)?;
        let used = u32::try_from(attempts.len()).unwrap_or(u32::MAX);
        Ok(AttemptHistory {
            quiz_id: quiz.id.clone(),
            max_attempts: quiz.max_attempts,
            used,
            remaining: remaining_attempts(quiz.max_attempts, used),
            attempts,
        })
    }

    /// Quiz content for an attempt, without answer keys, in the attempt's
    /// stable shuffled order.
    pub fn present_quiz(
        &self,
        principal: &Principal,
        attempt_id: &AttemptId,
    ) -> Result<QuizPresentation, AssessmentError> {
        let attempt = self.owned_attempt(principal, attempt_id)?;
        let quiz = self.quiz(&attempt.quiz_id)?;
        if attempt.is_expired(&quiz, self.clock.now()) {
            self.force_complete(attempt_id, &quiz)?;
            let closed = self.attempt(attempt_id)?;
            return Err(AssessmentError::AttemptNotActive {
                attempt_id: closed.id,
                status: closed.status,
            });
        }
        Ok(presentation::present(&quiz, &attempt))
    }

    /// Closes the learner's overdue in-progress attempt on this quiz, if any.
    fn expire_overdue(&self, principal: &Principal, quiz: &Quiz) -> Result<(), AssessmentError> {
        let now = self.clock.now();
        let overdue = self
            .store
            .attempts_for(&principal.user_id, &quiz.id)?
            .into_iter()
            .find(|attempt| attempt.is_expired(quiz, now));
        if let Some(attempt) = overdue {
            self.force_complete(&attempt.id, quiz)?;
        }
        Ok(())
    }

    /// Returns `None` when another request closed the attempt first.
    fn force_complete(
        &self,
        attempt_id: &AttemptId,
        quiz: &Quiz,
    ) -> Result<Option<QuizAttempt>, AssessmentError> {
        let closed = retry_on_contention(self.write_retries, "expire_attempt", || {
            let attempt = self.attempt(attempt_id)?;
            let now = self.clock.now();
            if !attempt.is_expired(quiz, now) {
                return Ok(None);
            }
            Ok(Some(self.finalize(attempt, quiz, now, true)?))
        })?;

        if let Some(attempt) = &closed {
            self.after_completion(attempt, quiz);
        }
        Ok(closed)
    }

    /// Applies scoring and writes the terminal state. The CAS write is what
    /// keeps completion single-writer.
    fn finalize(
        &self,
        mut attempt: QuizAttempt,
        quiz: &Quiz,
        now: DateTime<Utc>,
        auto_submitted: bool,
    ) -> Result<QuizAttempt, AssessmentError> {
        let AttemptScore {
            score,
            percentage,
            passed,
        } = score_attempt(&attempt, quiz);
        attempt.score = score;
        attempt.percentage = percentage;
        attempt.passed = passed;
        attempt.status = AttemptStatus::Completed;
        attempt.completed_at = Some(now);
        attempt.elapsed_seconds = Some(elapsed_seconds(attempt.started_at, now));
        attempt.auto_submitted = auto_submitted;
        Ok(self.store.update_attempt(attempt)?)
    }

    fn after_completion(&self, attempt: &QuizAttempt, quiz: &Quiz) -> Option<ProgressUpdate> {
        if attempt.auto_submitted {
            info!(
                learner = %attempt.learner_id,
                quiz = %quiz.id,
                attempt = %attempt.id,
                "quiz attempt expired and was auto-submitted"
            );
        }
        info!(
            learner = %attempt.learner_id,
            quiz = %quiz.id,
            attempt = %attempt.id,
            score = attempt.score,
            percentage = attempt.percentage,
            passed = attempt.passed,
            "quiz attempt completed"
        );

        dispatch(
            self.notifier.as_ref(),
            Notification::new(attempt.learner_id.clone(), NotificationEvent::QuizCompleted)
                .with("quiz_id", &quiz.id)
                .with("quiz_title", &quiz.title)
                .with("percentage", format!("{:.2}", attempt.percentage))
                .with("passed", attempt.passed),
        );

        let topic_id = quiz.topic_id.as_ref().filter(|_| attempt.passed)?;
        match self
            .progress
            .complete_topic_for(&attempt.learner_id, &quiz.course_id, topic_id)
        {
            Ok(update) => Some(update),
            Err(err) => {
                warn!(
                    learner = %attempt.learner_id,
                    quiz = %quiz.id,
                    topic = %topic_id,
                    error = %err,
                    "passed quiz could not update topic progress"
                );
                None
            }
        }
    }
}

fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_seconds().max(0)
}
