use std::sync::Arc;

use super::assignments::{AssignmentGradingPipeline, AutoGrader, ManualReviewGrader};
use super::certificates::CertificateIssuer;
use super::domain::CourseId;
use super::error::AssessmentError;
use super::gradebook;
use super::notifications::Notifier;
use super::progress::ProgressTracker;
use super::quiz::QuizAttemptEngine;
use super::repository::AssessmentStore;
use super::scoring::ScoringRules;
use crate::auth::Principal;
use crate::clock::Clock;
use crate::config::AssessmentConfig;

/// Facade wiring the four engines over one store, notifier and clock.
pub struct AssessmentService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    rules: Arc<ScoringRules>,
    progress: Arc<ProgressTracker<S, N>>,
    quizzes: QuizAttemptEngine<S, N>,
    assignments: AssignmentGradingPipeline<S, N>,
    certificates: CertificateIssuer<S, N>,
}

impl<S, N> AssessmentService<S, N>
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        config: AssessmentConfig,
    ) -> Self {
        Self::with_auto_grader(store, notifier, clock, config, Arc::new(ManualReviewGrader))
    }

    pub fn with_auto_grader(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        config: AssessmentConfig,
        auto_grader: Arc<dyn AutoGrader>,
    ) -> Self {
        let retries = config.write_retries;
        let rules = Arc::new(ScoringRules::new(config.scoring));
        let progress = Arc::new(ProgressTracker::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            retries,
        ));

        Self {
            quizzes: QuizAttemptEngine::new(
                store.clone(),
                notifier.clone(),
                clock.clone(),
                progress.clone(),
                retries,
            ),
            assignments: AssignmentGradingPipeline::new(
                store.clone(),
                notifier.clone(),
                clock.clone(),
                rules.clone(),
                auto_grader,
                retries,
            ),
            certificates: CertificateIssuer::new(
                store.clone(),
                notifier.clone(),
                clock,
                rules.clone(),
                config.certificate_validity_days,
                retries,
            ),
            store,
            notifier,
            rules,
            progress,
        }
    }

    pub fn quizzes(&self) -> &QuizAttemptEngine<S, N> {
        &self.quizzes
    }

    pub fn assignments(&self) -> &AssignmentGradingPipeline<S, N> {
        &self.assignments
    }

    pub fn progress(&self) -> &ProgressTracker<S, N> {
        &self.progress
    }

    pub fn certificates(&self) -> &CertificateIssuer<S, N> {
        &self.certificates
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }

    pub fn gradebook_csv(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<String, AssessmentError> {
        let standings = self.certificates.gradebook(principal, course_id)?;
        Ok(gradebook::to_csv_string(&standings)?)
    }
}
