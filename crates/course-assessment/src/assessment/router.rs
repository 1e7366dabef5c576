use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::assignments::GradeInput;
use super::domain::{
    AnswerResponse, AssignmentId, AttemptId, CertificateCode, CourseId, EnrollmentStatus,
    ModuleId, QuestionId, QuizId, SubmissionContent, SubmissionId, TopicId,
};
use super::error::AssessmentError;
use super::notifications::Notifier;
use super::quiz::remaining_attempts;
use super::repository::AssessmentStore;
use super::service::AssessmentService;
use crate::auth::{bearer_token, Authenticator, Principal};

/// Shared handler state: the service plus the token resolver.
pub struct AssessmentState<S, N> {
    pub service: Arc<AssessmentService<S, N>>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl<S, N> Clone for AssessmentState<S, N> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            authenticator: self.authenticator.clone(),
        }
    }
}

impl<S, N> AssessmentState<S, N> {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| unauthorized("missing bearer token"))?;
        self.authenticator
            .authenticate(token)
            .ok_or_else(|| unauthorized("unknown or expired bearer token"))
    }
}

fn unauthorized(message: &str) -> Response {
    let payload = json!({
        "error": "unauthorized",
        "message": message,
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

impl IntoResponse for AssessmentError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, mut payload) = match &self {
            AssessmentError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                json!({ "entity": entity, "id": id }),
            ),
            AssessmentError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({})),
            AssessmentError::AttemptLimitExceeded { max_attempts, used } => (
                StatusCode::CONFLICT,
                json!({
                    "max_attempts": max_attempts,
                    "used": used,
                    "remaining": remaining_attempts(*max_attempts, *used).unwrap_or(0),
                }),
            ),
            AssessmentError::AttemptAlreadyActive { attempt_id } => {
                (StatusCode::CONFLICT, json!({ "attempt_id": attempt_id }))
            }
            AssessmentError::AttemptNotActive { attempt_id, status } => (
                StatusCode::CONFLICT,
                json!({ "attempt_id": attempt_id, "status": status }),
            ),
            AssessmentError::DuplicateAnswer { question_id } => {
                (StatusCode::CONFLICT, json!({ "question_id": question_id }))
            }
            AssessmentError::DeadlinePassed { due_date } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "due_date": due_date }),
            ),
            AssessmentError::AlreadyGraded { submission_id } => (
                StatusCode::CONFLICT,
                json!({ "submission_id": submission_id }),
            ),
            AssessmentError::AlreadyIssued { certificate_code }
            | AssessmentError::AlreadyRevoked { certificate_code } => (
                StatusCode::CONFLICT,
                json!({ "certificate_code": certificate_code }),
            ),
            AssessmentError::NotCompleted { progress } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "progress": progress }),
            ),
            AssessmentError::ValidationError(_) => (StatusCode::BAD_REQUEST, json!({})),
            AssessmentError::Conflict(_) => (StatusCode::CONFLICT, json!({})),
            AssessmentError::Repository(_) | AssessmentError::Export(_) => {
                error!(error = %self, "assessment request failed");
                let payload = json!({
                    "error": kind,
                    "message": "internal error",
                });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response();
            }
        };

        payload["error"] = json!(kind);
        payload["message"] = json!(self.to_string());
        (status, Json(payload)).into_response()
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, AssessmentError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

macro_rules! authenticated {
    ($state:expr, $headers:expr) => {
        match $state.authenticate(&$headers) {
            Ok(principal) => principal,
            Err(response) => return response,
        }
    };
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: QuestionId,
    pub response: AnswerResponse,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopicAccessRequest {
    #[serde(default)]
    pub seconds_spent: u64,
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentStatusRequest {
    pub status: EnrollmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
    #[serde(default)]
    pub review: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

/// HTTP surface of the assessment engines.
pub fn assessment_router<S, N>(
    service: Arc<AssessmentService<S, N>>,
    authenticator: Arc<dyn Authenticator>,
) -> Router
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/courses/:course_id/enrollment",
            post(enroll_handler::<S, N>)
                .delete(unenroll_handler::<S, N>)
                .patch(enrollment_status_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/progress",
            get(course_progress_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/modules/:module_id/progress",
            get(module_progress_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/topics/:topic_id/access",
            post(topic_access_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/topics/:topic_id/complete",
            post(complete_topic_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/rating",
            post(rate_course_handler::<S, N>).get(course_rating_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/certificate",
            post(request_certificate_handler::<S, N>),
        )
        .route(
            "/api/v1/courses/:course_id/gradebook",
            get(gradebook_handler::<S, N>),
        )
        .route(
            "/api/v1/quizzes/:quiz_id/attempts",
            post(start_attempt_handler::<S, N>).get(list_attempts_handler::<S, N>),
        )
        .route(
            "/api/v1/attempts/:attempt_id",
            get(get_attempt_handler::<S, N>),
        )
        .route(
            "/api/v1/attempts/:attempt_id/quiz",
            get(present_quiz_handler::<S, N>),
        )
        .route(
            "/api/v1/attempts/:attempt_id/answers",
            post(submit_answer_handler::<S, N>),
        )
        .route(
            "/api/v1/attempts/:attempt_id/complete",
            post(complete_attempt_handler::<S, N>),
        )
        .route(
            "/api/v1/attempts/:attempt_id/abandon",
            post(abandon_attempt_handler::<S, N>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/submissions",
            post(submit_assignment_handler::<S, N>).get(list_submissions_handler::<S, N>),
        )
        .route(
            "/api/v1/submissions/:submission_id",
            get(get_submission_handler::<S, N>),
        )
        .route(
            "/api/v1/submissions/:submission_id/grade",
            post(grade_submission_handler::<S, N>),
        )
        .route(
            "/api/v1/submissions/:submission_id/return",
            post(return_submission_handler::<S, N>),
        )
        .route("/api/v1/certificates", get(list_certificates_handler::<S, N>))
        .route(
            "/api/v1/certificates/:code/verify",
            get(verify_certificate_handler::<S, N>),
        )
        .route(
            "/api/v1/certificates/:code/revoke",
            post(revoke_certificate_handler::<S, N>),
        )
        .route(
            "/api/v1/certificates/:code/reinstate",
            post(reinstate_certificate_handler::<S, N>),
        )
        .with_state(AssessmentState {
            service,
            authenticator,
        })
}

pub(crate) async fn enroll_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::CREATED,
        state
            .service
            .progress()
            .enroll(&principal, &CourseId(course_id)),
    )
}

pub(crate) async fn unenroll_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    match state
        .service
        .progress()
        .unenroll(&principal, &CourseId(course_id))
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn enrollment_status_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
    Json(request): Json<EnrollmentStatusRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.progress().set_enrollment_status(
            &principal,
            &CourseId(course_id),
            request.status,
        ),
    )
}

pub(crate) async fn course_progress_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .progress()
            .course_progress(&principal, &CourseId(course_id)),
    )
}

pub(crate) async fn module_progress_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path((course_id, module_id)): Path<(String, String)>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.progress().module_progress(
            &principal,
            &CourseId(course_id),
            &ModuleId(module_id),
        ),
    )
}

pub(crate) async fn topic_access_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path((course_id, topic_id)): Path<(String, String)>,
    Json(request): Json<TopicAccessRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.progress().record_topic_access(
            &principal,
            &CourseId(course_id),
            &TopicId(topic_id),
            request.seconds_spent,
        ),
    )
}

pub(crate) async fn complete_topic_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path((course_id, topic_id)): Path<(String, String)>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.progress().complete_topic(
            &principal,
            &CourseId(course_id),
            &TopicId(topic_id),
        ),
    )
}

pub(crate) async fn rate_course_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
    Json(request): Json<RatingRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.progress().rate_course(
            &principal,
            &CourseId(course_id),
            request.rating,
            request.review,
        ),
    )
}

pub(crate) async fn course_rating_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    Path(course_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        state.service.progress().course_rating(&CourseId(course_id)),
    )
}

pub(crate) async fn request_certificate_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::CREATED,
        state
            .service
            .certificates()
            .request(&principal, &CourseId(course_id)),
    )
}

pub(crate) async fn gradebook_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    match state
        .service
        .gradebook_csv(&principal, &CourseId(course_id))
    {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn start_attempt_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(quiz_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::CREATED,
        state.service.quizzes().start(&principal, &QuizId(quiz_id)),
    )
}

pub(crate) async fn list_attempts_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(quiz_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .quizzes()
            .list_attempts(&principal, &QuizId(quiz_id)),
    )
}

pub(crate) async fn get_attempt_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(attempt_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .quizzes()
            .get_attempt(&principal, &AttemptId(attempt_id)),
    )
}

pub(crate) async fn present_quiz_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(attempt_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .quizzes()
            .present_quiz(&principal, &AttemptId(attempt_id)),
    )
}

pub(crate) async fn submit_answer_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(attempt_id): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.quizzes().submit_answer(
            &principal,
            &AttemptId(attempt_id),
            &request.question_id,
            request.response,
        ),
    )
}

pub(crate) async fn complete_attempt_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(attempt_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .quizzes()
            .complete(&principal, &AttemptId(attempt_id)),
    )
}

pub(crate) async fn abandon_attempt_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(attempt_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .quizzes()
            .abandon(&principal, &AttemptId(attempt_id)),
    )
}

pub(crate) async fn submit_assignment_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
    Json(content): Json<SubmissionContent>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::CREATED,
        state
            .service
            .assignments()
            .submit(&principal, &AssignmentId(assignment_id), content),
    )
}

pub(crate) async fn list_submissions_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .assignments()
            .list_submissions(&principal, &AssignmentId(assignment_id)),
    )
}

pub(crate) async fn get_submission_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .assignments()
            .get_submission(&principal, &SubmissionId(submission_id)),
    )
}

pub(crate) async fn grade_submission_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
    Json(input): Json<GradeInput>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .assignments()
            .grade(&principal, &SubmissionId(submission_id), input),
    )
}

pub(crate) async fn return_submission_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
    Json(request): Json<ReturnRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.assignments().return_for_revision(
            &principal,
            &SubmissionId(submission_id),
            request.feedback,
        ),
    )
}

pub(crate) async fn list_certificates_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state.service.certificates().list_for_learner(&principal),
    )
}

/// Public: no bearer token required.
pub(crate) async fn verify_certificate_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    Path(code): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        state
            .service
            .certificates()
            .verify(&CertificateCode(code)),
    )
}

pub(crate) async fn revoke_certificate_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(request): Json<RevokeRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .certificates()
            .revoke(&principal, &CertificateCode(code), request.reason),
    )
}

pub(crate) async fn reinstate_certificate_handler<S, N>(
    State(state): State<AssessmentState<S, N>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(state, headers);
    respond(
        StatusCode::OK,
        state
            .service
            .certificates()
            .reinstate(&principal, &CertificateCode(code)),
    )
}
