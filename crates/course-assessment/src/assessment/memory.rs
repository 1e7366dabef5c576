use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Assignment, AssignmentId, AssignmentSubmission, AttemptId, AttemptStatus, Certificate,
    CertificateCode, Course, CourseId, CourseRating, Enrollment, Quiz, QuizAttempt, QuizId,
    SubmissionId, TopicId, TopicProgress, UserId,
};
use super::repository::{
    constraint, AttemptRepository, CatalogRepository, CertificateRepository,
    EnrollmentRepository, RatingRepository, RepositoryError, SubmissionRepository,
    TopicProgressRepository,
};

#[derive(Debug, Default)]
struct Tables {
    courses: HashMap<CourseId, Course>,
    quizzes: HashMap<QuizId, Quiz>,
    assignments: HashMap<AssignmentId, Assignment>,
    enrollments: HashMap<(UserId, CourseId), Enrollment>,
    topic_progress: HashMap<(UserId, CourseId, TopicId), TopicProgress>,
    attempts: HashMap<AttemptId, QuizAttempt>,
    submissions: HashMap<SubmissionId, AssignmentSubmission>,
    certificates: HashMap<CertificateCode, Certificate>,
    ratings: HashMap<CourseId, CourseRating>,
}

/// Process-local store. Each trait call holds the table lock for its whole
/// check-and-write, which is what makes the guarded inserts atomic.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("store mutex poisoned")
    }

    pub fn seed_course(&self, course: Course) {
        self.tables().courses.insert(course.id.clone(), course);
    }

    pub fn seed_quiz(&self, quiz: Quiz) {
        self.tables().quizzes.insert(quiz.id.clone(), quiz);
    }

    pub fn seed_assignment(&self, assignment: Assignment) {
        self.tables()
            .assignments
            .insert(assignment.id.clone(), assignment);
    }
}

fn check_version(stored: u64, incoming: u64) -> Result<(), RepositoryError> {
    if stored == incoming {
        Ok(())
    } else {
        Err(RepositoryError::Stale)
    }
}

impl CatalogRepository for MemoryStore {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.tables().courses.get(id).cloned())
    }

    fn quiz(&self, id: &QuizId) -> Result<Option<Quiz>, RepositoryError> {
        Ok(self.tables().quizzes.get(id).cloned())
    }

    fn assignment(&self, id: &AssignmentId) -> Result<Option<Assignment>, RepositoryError> {
        Ok(self.tables().assignments.get(id).cloned())
    }

    fn quizzes_for_course(&self, course_id: &CourseId) -> Result<Vec<Quiz>, RepositoryError> {
        let mut quizzes: Vec<Quiz> = self
            .tables()
            .quizzes
            .values()
            .filter(|quiz| &quiz.course_id == course_id)
            .cloned()
            .collect();
        quizzes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(quizzes)
    }

    fn assignments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        let mut assignments: Vec<Assignment> = self
            .tables()
            .assignments
            .values()
            .filter(|assignment| &assignment.course_id == course_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(assignments)
    }
}

impl EnrollmentRepository for MemoryStore {
    fn insert_enrollment(&self, mut enrollment: Enrollment) -> Result<Enrollment, RepositoryError> {
        let mut tables = self.tables();
        let key = (enrollment.learner_id.clone(), enrollment.course_id.clone());
        if tables.enrollments.contains_key(&key) {
            return Err(RepositoryError::Conflict(constraint::ENROLLMENT));
        }
        enrollment.version = 1;
        tables.enrollments.insert(key, enrollment.clone());
        Ok(enrollment)
    }

    fn update_enrollment(&self, mut enrollment: Enrollment) -> Result<Enrollment, RepositoryError> {
        let mut tables = self.tables();
        let key = (enrollment.learner_id.clone(), enrollment.course_id.clone());
        let stored = tables
            .enrollments
            .get(&key)
            .ok_or(RepositoryError::NotFound)?;
        check_version(stored.version, enrollment.version)?;
        enrollment.version += 1;
        tables.enrollments.insert(key, enrollment.clone());
        Ok(enrollment)
    }

    fn fetch_enrollment(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .tables()
            .enrollments
            .get(&(learner_id.clone(), course_id.clone()))
            .cloned())
    }

    fn delete_enrollment(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .tables()
            .enrollments
            .remove(&(learner_id.clone(), course_id.clone()))
            .is_some())
    }

    fn enrollments_for_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut enrollments: Vec<Enrollment> = self
            .tables()
            .enrollments
            .values()
            .filter(|enrollment| &enrollment.course_id == course_id)
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| a.learner_id.cmp(&b.learner_id));
        Ok(enrollments)
    }
}

impl TopicProgressRepository for MemoryStore {
    fn fetch_topic_progress(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
        topic_id: &TopicId,
    ) -> Result<Option<TopicProgress>, RepositoryError> {
        Ok(self
            .tables()
            .topic_progress
            .get(&(learner_id.clone(), course_id.clone(), topic_id.clone()))
            .cloned())
    }

    fn upsert_topic_progress(
        &self,
        mut progress: TopicProgress,
    ) -> Result<TopicProgress, RepositoryError> {
        let mut tables = self.tables();
        let key = (
            progress.learner_id.clone(),
            progress.course_id.clone(),
            progress.topic_id.clone(),
        );
        let stored_version = tables.topic_progress.get(&key).map_or(0, |p| p.version);
        check_version(stored_version, progress.version)?;
        progress.version += 1;
        tables.topic_progress.insert(key, progress.clone());
        Ok(progress)
    }

    fn topic_progress_for_course(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<TopicProgress>, RepositoryError> {
        let mut records: Vec<TopicProgress> = self
            .tables()
            .topic_progress
            .values()
            .filter(|p| &p.learner_id == learner_id && &p.course_id == course_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(records)
    }
}

impl AttemptRepository for MemoryStore {
    fn insert_attempt(&self, mut attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError> {
        let mut tables = self.tables();
        let same_quiz = |existing: &&QuizAttempt| {
            existing.learner_id == attempt.learner_id && existing.quiz_id == attempt.quiz_id
        };
        if tables
            .attempts
            .values()
            .filter(same_quiz)
            .any(|existing| existing.attempt_number == attempt.attempt_number)
        {
            return Err(RepositoryError::Conflict(constraint::ATTEMPT_NUMBER));
        }
        if attempt.is_in_progress()
            && tables
                .attempts
                .values()
                .filter(same_quiz)
                .any(|existing| existing.is_in_progress())
        {
            return Err(RepositoryError::Conflict(constraint::ACTIVE_ATTEMPT));
        }
        attempt.version = 1;
        tables.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(attempt)
    }

    fn update_attempt(&self, mut attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .attempts
            .get(&attempt.id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(stored.version, attempt.version)?;
        if attempt.status == AttemptStatus::InProgress
            && tables.attempts.values().any(|existing| {
                existing.id != attempt.id
                    && existing.learner_id == attempt.learner_id
                    && existing.quiz_id == attempt.quiz_id
                    && existing.is_in_progress()
            })
        {
            return Err(RepositoryError::Conflict(constraint::ACTIVE_ATTEMPT));
        }
        attempt.version += 1;
        tables.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(attempt)
    }

    fn fetch_attempt(&self, id: &AttemptId) -> Result<Option<QuizAttempt>, RepositoryError> {
        Ok(self.tables().attempts.get(id).cloned())
    }

    fn attempts_for(
        &self,
        learner_id: &UserId,
        quiz_id: &QuizId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError> {
        let mut attempts: Vec<QuizAttempt> = self
            .tables()
            .attempts
            .values()
            .filter(|a| &a.learner_id == learner_id && &a.quiz_id == quiz_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    fn attempts_for_course(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError> {
        let mut attempts: Vec<QuizAttempt> = self
            .tables()
            .attempts
            .values()
            .filter(|a| &a.learner_id == learner_id && &a.course_id == course_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| {
            (&a.quiz_id, a.attempt_number).cmp(&(&b.quiz_id, b.attempt_number))
        });
        Ok(attempts)
    }
}

impl SubmissionRepository for MemoryStore {
    fn insert_submission(
        &self,
        mut submission: AssignmentSubmission,
    ) -> Result<AssignmentSubmission, RepositoryError> {
        let mut tables = self.tables();
        if tables.submissions.values().any(|existing| {
            existing.learner_id == submission.learner_id
                && existing.assignment_id == submission.assignment_id
                && existing.attempt_number == submission.attempt_number
        }) {
            return Err(RepositoryError::Conflict(constraint::SUBMISSION_NUMBER));
        }
        submission.version = 1;
        tables
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn update_submission(
        &self,
        mut submission: AssignmentSubmission,
    ) -> Result<AssignmentSubmission, RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .submissions
            .get(&submission.id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(stored.version, submission.version)?;
        submission.version += 1;
        tables
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn fetch_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<AssignmentSubmission>, RepositoryError> {
        Ok(self.tables().submissions.get(id).cloned())
    }

    fn submissions_for(
        &self,
        learner_id: &UserId,
        assignment_id: &AssignmentId,
    ) -> Result<Vec<AssignmentSubmission>, RepositoryError> {
        let mut submissions: Vec<AssignmentSubmission> = self
            .tables()
            .submissions
            .values()
            .filter(|s| &s.learner_id == learner_id && &s.assignment_id == assignment_id)
            .cloned()
            .collect();
        submissions.sort_by_key(|s| s.attempt_number);
        Ok(submissions)
    }

    fn submissions_for_course(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<AssignmentSubmission>, RepositoryError> {
        let mut submissions: Vec<AssignmentSubmission> = self
            .tables()
            .submissions
            .values()
            .filter(|s| &s.learner_id == learner_id && &s.course_id == course_id)
            .cloned()
            .collect();
        submissions.sort_by(|a, b| {
            (&a.assignment_id, a.attempt_number).cmp(&(&b.assignment_id, b.attempt_number))
        });
        Ok(submissions)
    }
}

fn conflicting_active(tables: &Tables, certificate: &Certificate) -> bool {
    certificate.is_active()
        && tables.certificates.values().any(|existing| {
            existing.code != certificate.code
                && existing.is_active()
                && existing.learner_id == certificate.learner_id
                && existing.course_id == certificate.course_id
        })
}

impl CertificateRepository for MemoryStore {
    fn insert_certificate(
        &self,
        mut certificate: Certificate,
    ) -> Result<Certificate, RepositoryError> {
        let mut tables = self.tables();
        if tables.certificates.contains_key(&certificate.code) {
            return Err(RepositoryError::Conflict(constraint::CERTIFICATE_CODE));
        }
        if conflicting_active(&tables, &certificate) {
            return Err(RepositoryError::Conflict(constraint::ACTIVE_CERTIFICATE));
        }
        certificate.version = 1;
        tables
            .certificates
            .insert(certificate.code.clone(), certificate.clone());
        Ok(certificate)
    }

    fn update_certificate(
        &self,
        mut certificate: Certificate,
    ) -> Result<Certificate, RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .certificates
            .get(&certificate.code)
            .ok_or(RepositoryError::NotFound)?;
        check_version(stored.version, certificate.version)?;
        if conflicting_active(&tables, &certificate) {
            return Err(RepositoryError::Conflict(constraint::ACTIVE_CERTIFICATE));
        }
        certificate.version += 1;
        tables
            .certificates
            .insert(certificate.code.clone(), certificate.clone());
        Ok(certificate)
    }

    fn fetch_certificate(
        &self,
        code: &CertificateCode,
    ) -> Result<Option<Certificate>, RepositoryError> {
        Ok(self.tables().certificates.get(code).cloned())
    }

    fn active_certificate(
        &self,
        learner_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError> {
        Ok(self
            .tables()
            .certificates
            .values()
            .find(|c| c.is_active() && &c.learner_id == learner_id && &c.course_id == course_id)
            .cloned())
    }

    fn certificates_for_learner(
        &self,
        learner_id: &UserId,
    ) -> Result<Vec<Certificate>, RepositoryError> {
        let mut certificates: Vec<Certificate> = self
            .tables()
            .certificates
            .values()
            .filter(|c| &c.learner_id == learner_id)
            .cloned()
            .collect();
        certificates.sort_by_key(|c| c.issued_at);
        Ok(certificates)
    }
}

impl RatingRepository for MemoryStore {
    fn save_course_rating(
        &self,
        mut rating: CourseRating,
    ) -> Result<CourseRating, RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .ratings
            .get(&rating.course_id)
            .map_or(0, |current| current.version);
        check_version(stored, rating.version)?;
        rating.version += 1;
        tables.ratings.insert(rating.course_id.clone(), rating.clone());
        Ok(rating)
    }

    fn course_rating(&self, course_id: &CourseId) -> Result<Option<CourseRating>, RepositoryError> {
        Ok(self.tables().ratings.get(course_id).cloned())
    }
}
