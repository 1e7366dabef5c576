use crate::infra::{
    demo_admin, demo_graduate, demo_grader, demo_learner, demo_peer, demo_seed, BORROW_ESSAY,
    DEMO_COURSE, OWNERSHIP_QUIZ, TRAITS_QUIZ,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Args;
use course_assessment::assessment::domain::RubricScore;
use course_assessment::assessment::gradebook;
use course_assessment::assessment::repository::CatalogRepository;
use course_assessment::assessment::{
    AnswerResponse, AssessmentError, AssessmentService, AssignmentId, CourseId, EnrollmentStatus,
    GradeInput, MemoryNotifier, MemoryStore, QuestionId, QuizId, SubmissionContent, TopicId,
};
use course_assessment::auth::Principal;
use course_assessment::clock::{Clock, ManualClock};
use course_assessment::config::AssessmentConfig;
use course_assessment::error::AppError;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Demo clock start (RFC 3339). Defaults to 2025-03-03T09:00:00Z.
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) start: Option<DateTime<Utc>>,
    /// Write the course gradebook CSV to this path.
    #[arg(long)]
    pub(crate) gradebook: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizScenario {
    pub(crate) score: f64,
    pub(crate) total_points: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct LatePenaltyScenario {
    pub(crate) days_late: u32,
    pub(crate) late_penalty: f64,
    pub(crate) raw_score: f64,
    pub(crate) final_score: f64,
    pub(crate) passed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProgressScenario {
    pub(crate) progress_sequence: Vec<u8>,
    pub(crate) completed_at_step: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CertificateScenario {
    pub(crate) certificate_code: String,
    pub(crate) average_quiz_score: f64,
    pub(crate) average_assignment_score: f64,
    pub(crate) final_score: f64,
    pub(crate) grade: String,
    pub(crate) verified: bool,
    pub(crate) valid_after_revocation: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DemoSummary {
    pub(crate) quiz_attempt: QuizScenario,
    pub(crate) late_submission: LatePenaltyScenario,
    pub(crate) course_progress: ProgressScenario,
    pub(crate) certificate: CertificateScenario,
    pub(crate) notifications_sent: usize,
}

pub(crate) struct Demo {
    clock: Arc<ManualClock>,
    notifier: Arc<MemoryNotifier>,
    service: AssessmentService<MemoryStore, MemoryNotifier>,
    course: CourseId,
}

fn default_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

impl Demo {
    fn new(start: DateTime<Utc>) -> Self {
        let (store, _) = demo_seed(start).into_parts();
        let clock = Arc::new(ManualClock::new(start));
        let notifier = Arc::new(MemoryNotifier::default());
        let service = AssessmentService::new(
            Arc::new(store),
            notifier.clone(),
            clock.clone(),
            AssessmentConfig::default(),
        );
        Self {
            clock,
            notifier,
            service,
            course: CourseId::new(DEMO_COURSE),
        }
    }

    fn enroll(&self, learner: &Principal) -> Result<(), AppError> {
        self.service.progress().enroll(learner, &self.course)?;
        Ok(())
    }

    /// One of two equally weighted questions answered correctly.
    fn quiz_attempt(&self) -> Result<QuizScenario, AppError> {
        let learner = demo_learner();
        self.enroll(&learner)?;
        let quiz_id = QuizId::new(OWNERSHIP_QUIZ);
        let total_points = self
            .service
            .store()
            .quiz(&quiz_id)
            .map_err(AssessmentError::from)?
            .map_or(0.0, |quiz| quiz.total_points());
        let quizzes = self.service.quizzes();
        let attempt = quizzes.start(&learner, &quiz_id)?;
        quizzes.submit_answer(
            &learner,
            &attempt.id,
            &QuestionId::new("q1"),
            AnswerResponse::Choice {
                option_id: "b".to_string(),
            },
        )?;
        quizzes.submit_answer(
            &learner,
            &attempt.id,
            &QuestionId::new("q2"),
            AnswerResponse::Boolean { value: true },
        )?;
        self.clock.advance(Duration::minutes(12));
        let outcome = quizzes.complete(&learner, &attempt.id)?;
        Ok(QuizScenario {
            score: outcome.attempt.score,
            total_points,
            percentage: outcome.attempt.percentage,
            passed: outcome.attempt.passed,
        })
    }

    /// Eight topics completed one at a time.
    fn course_progress(&self) -> Result<ProgressScenario, AppError> {
        let learner = demo_peer();
        self.enroll(&learner)?;
        let mut progress_sequence = Vec::new();
        let mut completed_at_step = None;
        for step in 1..=8 {
            let update = self.service.progress().complete_topic(
                &learner,
                &self.course,
                &TopicId::new(format!("t{step}")),
            )?;
            progress_sequence.push(update.progress);
            if update.course_completed {
                completed_at_step = Some(step);
            }
        }
        Ok(ProgressScenario {
            progress_sequence,
            completed_at_step,
        })
    }

    /// 80% on the traits quiz, 90 on the essay, then the certificate.
    fn certificate(&self) -> Result<CertificateScenario, AppError> {
        let learner = demo_graduate();
        self.enroll(&learner)?;

        let quizzes = self.service.quizzes();
        let attempt = quizzes.start(&learner, &QuizId::new(TRAITS_QUIZ))?;
        for (question, value) in [
            ("tq1", true),
            ("tq2", false),
            ("tq3", true),
            ("tq4", true),
            ("tq5", true),
        ] {
            quizzes.submit_answer(
                &learner,
                &attempt.id,
                &QuestionId::new(question),
                AnswerResponse::Boolean { value },
            )?;
        }
        quizzes.complete(&learner, &attempt.id)?;

        let assignments = self.service.assignments();
        let submission = assignments.submit(
            &learner,
            &AssignmentId::new(BORROW_ESSAY),
            SubmissionContent {
                text: Some("Shared references or one mutable reference, never both.".to_string()),
                ..SubmissionContent::default()
            },
        )?;
        assignments.grade(
            &demo_grader(),
            &submission.id,
            GradeInput {
                raw_score: None,
                rubric_scores: vec![
                    RubricScore {
                        criterion: "accuracy".to_string(),
                        points: 54.0,
                        comment: None,
                    },
                    RubricScore {
                        criterion: "clarity".to_string(),
                        points: 36.0,
                        comment: Some("Good use of examples.".to_string()),
                    },
                ],
                feedback: Some("Strong essay.".to_string()),
            },
        )?;

        for step in 1..=8 {
            self.service.progress().complete_topic(
                &learner,
                &self.course,
                &TopicId::new(format!("t{step}")),
            )?;
        }

        let issuer = self.service.certificates();
        let certificate = issuer.request(&learner, &self.course)?;
        let verified = issuer.verify(&certificate.code)?.valid;
        issuer.revoke(
            &demo_admin(),
            &certificate.code,
            "demo revocation".to_string(),
        )?;
        let valid_after_revocation = issuer.verify(&certificate.code)?.valid;
        issuer.reinstate(&demo_admin(), &certificate.code)?;

        Ok(CertificateScenario {
            certificate_code: certificate.code.to_string(),
            average_quiz_score: certificate.metadata.average_quiz_score,
            average_assignment_score: certificate.metadata.average_assignment_score,
            final_score: certificate.final_score,
            grade: certificate.grade,
            verified,
            valid_after_revocation,
        })
    }

    /// Essay submitted two days and five hours after the due date.
    fn late_submission(&self) -> Result<LatePenaltyScenario, AppError> {
        let learner = demo_learner();
        let essay = AssignmentId::new(BORROW_ESSAY);
        let due = self
            .service
            .store()
            .assignment(&essay)
            .map_err(AssessmentError::from)?
            .and_then(|assignment| assignment.due_date)
            .unwrap_or_else(|| self.clock.now());
        self.clock.set(due + Duration::days(2) + Duration::hours(5));

        let assignments = self.service.assignments();
        let submission = assignments.submit(
            &learner,
            &essay,
            SubmissionContent {
                text: Some("Lifetimes bound every borrow.".to_string()),
                ..SubmissionContent::default()
            },
        )?;
        let raw_score = 90.0;
        let graded = assignments.grade(
            &demo_grader(),
            &submission.id,
            GradeInput {
                raw_score: Some(raw_score),
                ..GradeInput::default()
            },
        )?;
        Ok(LatePenaltyScenario {
            days_late: graded.days_late,
            late_penalty: graded.late_penalty,
            raw_score,
            final_score: graded.final_score.unwrap_or_default(),
            passed: graded.passed.unwrap_or(false),
        })
    }

    fn gradebook(&self, path: &Path) -> Result<(), AppError> {
        let standings = self
            .service
            .certificates()
            .gradebook(&demo_grader(), &self.course)?;
        gradebook::write_csv(File::create(path)?, &standings)?;
        Ok(())
    }
}

pub(crate) fn run_scenarios(start: DateTime<Utc>) -> Result<(Demo, DemoSummary), AppError> {
    let demo = Demo::new(start);
    let quiz_attempt = demo.quiz_attempt()?;
    let course_progress = demo.course_progress()?;
    let certificate = demo.certificate()?;
    let late_submission = demo.late_submission()?;
    let summary = DemoSummary {
        quiz_attempt,
        late_submission,
        course_progress,
        certificate,
        notifications_sent: demo.notifier.events().len(),
    };
    Ok((demo, summary))
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let start = args.start.unwrap_or_else(default_start);
    let (demo, summary) = run_scenarios(start)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = args.gradebook {
        demo.gradebook(&path)?;
        println!("Gradebook written to {}", path.display());
    }

    let graduates = demo
        .service
        .certificates()
        .gradebook(&demo_grader(), &demo.course)?
        .into_iter()
        .filter(|standing| standing.status == EnrollmentStatus::Completed)
        .count();
    println!("Learners with a completed enrollment: {graduates}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::parse_timestamp;

    fn start() -> DateTime<Utc> {
        parse_timestamp("2025-03-03T09:00:00Z").expect("valid timestamp")
    }

    #[test]
    fn scenarios_reproduce_the_reference_numbers() {
        let (_, summary) = run_scenarios(start()).expect("demo runs");

        let quiz = &summary.quiz_attempt;
        assert_eq!(quiz.score, 5.0);
        assert_eq!(quiz.total_points, 10.0);
        assert_eq!(quiz.percentage, 50.0);
        assert!(!quiz.passed);

        let late = &summary.late_submission;
        assert_eq!(late.days_late, 3);
        assert_eq!(late.late_penalty, 30.0);
        assert!((late.final_score - 63.0).abs() < 1e-9);
        assert!(!late.passed);

        assert_eq!(
            summary.course_progress.progress_sequence,
            vec![13, 25, 38, 50, 63, 75, 88, 100]
        );
        assert_eq!(summary.course_progress.completed_at_step, Some(8));

        let certificate = &summary.certificate;
        assert_eq!(certificate.average_quiz_score, 80.0);
        assert_eq!(certificate.average_assignment_score, 90.0);
        assert_eq!(certificate.final_score, 86.0);
        assert_eq!(certificate.grade, "B+");
        assert!(certificate.verified);
        assert!(!certificate.valid_after_revocation);
    }

    #[test]
    fn gradebook_export_lists_demo_learners() {
        let (demo, _) = run_scenarios(start()).expect("demo runs");
        let dir = std::env::temp_dir().join(format!(
            "course-assessment-demo-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("gradebook.csv");

        demo.gradebook(&path).expect("gradebook written");
        let csv = std::fs::read_to_string(&path).expect("csv readable");
        let learners: Vec<&str> = csv
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').next())
            .collect();
        assert_eq!(learners, vec!["ada", "linus", "mara"]);
        std::fs::remove_file(&path).ok();
    }
}
