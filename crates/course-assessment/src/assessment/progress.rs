use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::domain::{
    Course, CourseId, CourseModule, CourseRating, Enrollment, EnrollmentStatus, ModuleId, TopicId,
    TopicProgress, TopicStatus, UserId,
};
use super::error::AssessmentError;
use super::guard::{require_enrollment, retry_on_contention};
use super::notifications::{dispatch, Notification, NotificationEvent, Notifier};
use super::repository::{
    CatalogRepository, EnrollmentRepository, RatingRepository, TopicProgressRepository,
};
use crate::auth::Principal;
use crate::clock::Clock;

/// Result of marking a topic complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub course_id: CourseId,
    pub topic_id: TopicId,
    pub progress: u8,
    pub status: EnrollmentStatus,
    /// False when the topic had already been completed.
    pub newly_completed: bool,
    /// True only on the call that pushed the enrollment to completed.
    pub course_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub title: String,
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgressView {
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub progress: u8,
    pub completed_topics: Vec<TopicId>,
    pub total_topics: usize,
    pub last_accessed_topic: Option<TopicId>,
    pub modules: Vec<ModuleProgress>,
}

/// `round(completed / total * 100)`, 0 for an empty course.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (completed.min(total) as f64 / total as f64 * 100.0).round();
    ratio as u8
}

fn module_view(module: &CourseModule, enrollment: &Enrollment) -> ModuleProgress {
    let total = module.topics.len();
    let completed = module
        .topics
        .iter()
        .filter(|topic| enrollment.has_completed(&topic.id))
        .count();
    ModuleProgress {
        module_id: module.id.clone(),
        title: module.title.clone(),
        completed,
        total,
        percentage: progress_percent(completed, total),
    }
}

/// Aggregates topic completion into enrollment progress.
pub struct ProgressTracker<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    write_retries: u32,
}

impl<S, N> ProgressTracker<S, N>
where
    S: CatalogRepository
        + EnrollmentRepository
        + TopicProgressRepository
        + RatingRepository
        + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, clock: Arc<dyn Clock>, write_retries: u32) -> Self {
        Self {
            store,
            notifier,
            clock,
            write_retries,
        }
    }

    fn course(&self, course_id: &CourseId) -> Result<Course, AssessmentError> {
        self.store
            .course(course_id)?
            .ok_or_else(|| AssessmentError::not_found("course", course_id))
    }

    /// Enrolls the caller. Re-enrolling returns the existing record and
    /// reactivates a dropped one.
    pub fn enroll(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<Enrollment, AssessmentError> {
        self.course(course_id)?;
        let learner_id = &principal.user_id;

        let enrollment = retry_on_contention(self.write_retries, "enroll", || {
            match self.store.fetch_enrollment(learner_id, course_id)? {
                Some(mut existing) if existing.status == EnrollmentStatus::Dropped => {
                    existing.status = EnrollmentStatus::Active;
                    Ok(self.store.update_enrollment(existing)?)
                }
                Some(existing) => Ok(existing),
                None => {
                    let fresh = Enrollment::new(
                        learner_id.clone(),
                        course_id.clone(),
                        self.clock.now(),
                    );
                    Ok(self.store.insert_enrollment(fresh)?)
                }
            }
        })?;

        info!(learner = %learner_id, course = %course_id, "learner enrolled");
        Ok(enrollment)
    }

    pub fn unenroll(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<(), AssessmentError> {
        if !self
            .store
            .delete_enrollment(&principal.user_id, course_id)?
        {
            return Err(AssessmentError::not_found("enrollment", course_id));
        }
        info!(learner = %principal.user_id, course = %course_id, "learner unenrolled");
        self.recompute_course_rating(course_id)?;
        Ok(())
    }

    /// Upserts the topic record as in-progress and accumulates time spent.
    pub fn record_topic_access(
        &self,
        principal: &Principal,
        course_id: &CourseId,
        topic_id: &TopicId,
        seconds_spent: u64,
    ) -> Result<TopicProgress, AssessmentError> {
        let course = self.course(course_id)?;
        if !course.contains_topic(topic_id) {
            return Err(AssessmentError::not_found("topic", topic_id));
        }
        let learner_id = &principal.user_id;
        require_enrollment(self.store.as_ref(), learner_id, course_id)?;

        let progress = retry_on_contention(self.write_retries, "record_topic_access", || {
            let now = self.clock.now();
            let mut record = self
                .store
                .fetch_topic_progress(learner_id, course_id, topic_id)?
                .unwrap_or_else(|| {
                    TopicProgress::new(learner_id.clone(), course_id.clone(), topic_id.clone())
                });
            if record.status == TopicStatus::NotStarted {
                record.status = TopicStatus::InProgress;
            }
            record.time_spent_seconds = record.time_spent_seconds.saturating_add(seconds_spent);
            record.last_accessed_at = Some(now);
            Ok(self.store.upsert_topic_progress(record)?)
        })?;

        retry_on_contention(self.write_retries, "touch_enrollment", || {
            let mut enrollment = require_enrollment(self.store.as_ref(), learner_id, course_id)?;
            enrollment.last_accessed_topic = Some(topic_id.clone());
            enrollment.last_accessed_at = Some(self.clock.now());
            Ok(self.store.update_enrollment(enrollment)?)
        })?;

        Ok(progress)
    }

    pub fn complete_topic(
        &self,
        principal: &Principal,
        course_id: &CourseId,
        topic_id: &TopicId,
    ) -> Result<ProgressUpdate, AssessmentError> {
        self.complete_topic_for(&principal.user_id, course_id, topic_id)
    }

    /// Set-add of the topic followed by a recompute from the freshest
    /// enrollment read; the CAS write retries on a concurrent update so no
    /// completion is lost and repeats never double count.
    pub(crate) fn complete_topic_for(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
        topic_id: &TopicId,
    ) -> Result<ProgressUpdate, AssessmentError> {
        let course = self.course(course_id)?;
        if !course.contains_topic(topic_id) {
            return Err(AssessmentError::not_found("topic", topic_id));
        }
        require_enrollment(self.store.as_ref(), learner_id, course_id)?;

        retry_on_contention(self.write_retries, "complete_topic_progress", || {
            let now = self.clock.now();
            let mut record = self
                .store
                .fetch_topic_progress(learner_id, course_id, topic_id)?
                .unwrap_or_else(|| {
                    TopicProgress::new(learner_id.clone(), course_id.clone(), topic_id.clone())
                });
            if record.status == TopicStatus::Completed {
                return Ok(record);
            }
            record.status = TopicStatus::Completed;
            record.completed_at = Some(now);
            record.last_accessed_at = Some(now);
            Ok(self.store.upsert_topic_progress(record)?)
        })?;

        let update = retry_on_contention(self.write_retries, "complete_topic", || {
            let now = self.clock.now();
            let mut enrollment = require_enrollment(self.store.as_ref(), learner_id, course_id)?;
            let newly_completed = enrollment.mark_topic_completed(topic_id.clone());

            let completed_in_course = enrollment
                .completed_topics()
                .iter()
                .filter(|topic| course.contains_topic(topic))
                .count();
            let computed = progress_percent(completed_in_course, course.topic_count());
            enrollment.progress = enrollment.progress.max(computed);
            enrollment.last_accessed_topic = Some(topic_id.clone());
            enrollment.last_accessed_at = Some(now);

            let course_completed =
                enrollment.progress >= 100 && enrollment.status != EnrollmentStatus::Completed;
            if course_completed {
                enrollment.status = EnrollmentStatus::Completed;
                enrollment.completed_at = Some(now);
            }

            let stored = self.store.update_enrollment(enrollment)?;
            Ok(ProgressUpdate {
                course_id: course_id.clone(),
                topic_id: topic_id.clone(),
                progress: stored.progress,
                status: stored.status,
                newly_completed,
                course_completed,
            })
        })?;

        info!(
            learner = %learner_id,
            course = %course_id,
            topic = %topic_id,
            progress = update.progress,
            newly_completed = update.newly_completed,
            "topic completed"
        );

        if update.course_completed {
            info!(learner = %learner_id, course = %course_id, "enrollment completed");
            dispatch(
                self.notifier.as_ref(),
                Notification::new(learner_id.clone(), NotificationEvent::CourseCompleted)
                    .with("course_id", course_id)
                    .with("course_title", &course.title),
            );
        }

        Ok(update)
    }

    pub fn course_progress(
        &self,
        principal: &Principal,
        course_id: &CourseId,
    ) -> Result<CourseProgressView, AssessmentError> {
        let course = self.course(course_id)?;
        let enrollment = self
            .store
            .fetch_enrollment(&principal.user_id, course_id)?
            .ok_or_else(|| {
                AssessmentError::Forbidden(format!("not enrolled in course '{course_id}'"))
            })?;

        Ok(CourseProgressView {
            course_id: course.id.clone(),
            status: enrollment.status,
            progress: enrollment.progress,
            completed_topics: enrollment.completed_topics().to_vec(),
            total_topics: course.topic_count(),
            last_accessed_topic: enrollment.last_accessed_topic.clone(),
            modules: course
                .modules
                .iter()
                .map(|module| module_view(module, &enrollment))
                .collect(),
        })
    }

    /// Derived view; nothing is stored.
    pub fn module_progress(
        &self,
        principal: &Principal,
        course_id: &CourseId,
        module_id: &ModuleId,
    ) -> Result<ModuleProgress, AssessmentError> {
        let course = self.course(course_id)?;
        let module = course
            .module(module_id)
            .ok_or_else(|| AssessmentError::not_found("module", module_id))?;
        let enrollment = self
            .store
            .fetch_enrollment(&principal.user_id, course_id)?
            .ok_or_else(|| {
                AssessmentError::Forbidden(format!("not enrolled in course '{course_id}'"))
            })?;
        Ok(module_view(module, &enrollment))
    }

    /// Pause, resume or drop. Completion is only ever reached through progress.
    pub fn set_enrollment_status(
        &self,
        principal: &Principal,
        course_id: &CourseId,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, AssessmentError> {
        if status == EnrollmentStatus::Completed {
            return Err(AssessmentError::ValidationError(
                "completion is derived from progress and cannot be set".to_string(),
            ));
        }
        retry_on_contention(self.write_retries, "set_enrollment_status", || {
            let mut enrollment = self
                .store
                .fetch_enrollment(&principal.user_id, course_id)?
                .ok_or_else(|| AssessmentError::not_found("enrollment", course_id))?;
            if enrollment.status == EnrollmentStatus::Completed {
                return Err(AssessmentError::ValidationError(
                    "completed enrollments are final".to_string(),
                ));
            }
            enrollment.status = status;
            Ok(self.store.update_enrollment(enrollment)?)
        })
    }

    pub fn rate_course(
        &self,
        principal: &Principal,
        course_id: &CourseId,
        rating: u8,
        review: Option<String>,
    ) -> Result<CourseRating, AssessmentError> {
        if !(1..=5).contains(&rating) {
            return Err(AssessmentError::ValidationError(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        self.course(course_id)?;

        retry_on_contention(self.write_retries, "rate_course", || {
            let mut enrollment =
                require_enrollment(self.store.as_ref(), &principal.user_id, course_id)?;
            enrollment.rating = Some(rating);
            enrollment.review = review.clone();
            Ok(self.store.update_enrollment(enrollment)?)
        })?;

        self.recompute_course_rating(course_id)
    }

    /// The one place the course rating aggregate is derived. Idempotent; call
    /// after any mutation of enrollment ratings. The stored version is read
    /// before the enrollments, so a save computed from older ratings goes stale.
    pub fn recompute_course_rating(
        &self,
        course_id: &CourseId,
    ) -> Result<CourseRating, AssessmentError> {
        retry_on_contention(self.write_retries, "recompute_course_rating", || {
            let version = self
                .store
                .course_rating(course_id)?
                .map_or(0, |current| current.version);
            let ratings: Vec<u8> = self
                .store
                .enrollments_for_course(course_id)?
                .iter()
                .filter_map(|enrollment| enrollment.rating)
                .collect();
            let count = u32::try_from(ratings.len()).unwrap_or(u32::MAX);
            let average = if ratings.is_empty() {
                0.0
            } else {
                let sum: f64 = ratings.iter().map(|r| f64::from(*r)).sum();
                (sum / ratings.len() as f64 * 100.0).round() / 100.0
            };
            Ok(self.store.save_course_rating(CourseRating {
                course_id: course_id.clone(),
                average,
                count,
                version,
            })?)
        })
    }

    pub fn course_rating(&self, course_id: &CourseId) -> Result<CourseRating, AssessmentError> {
        match self.store.course_rating(course_id)? {
            Some(rating) => Ok(rating),
            None => self.recompute_course_rating(course_id),
        }
    }
}
