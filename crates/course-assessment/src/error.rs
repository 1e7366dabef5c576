use crate::assessment::AssessmentError;
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Top-level failure for the binary and for handlers outside the engines.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("seed data error: {0}")]
    Seed(#[from] serde_json::Error),
    #[error("export error: {0}")]
    Export(#[from] csv::Error),
    #[error("assessment error: {0}")]
    Assessment(#[from] AssessmentError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Assessment(err) => return err.into_response(),
            AppError::Seed(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_errors_map_to_bad_request() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn io_errors_map_to_internal() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing seed");
        let app = AppError::from(err);
        assert!(app.to_string().contains("missing seed"));
        assert_eq!(app.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn assessment_errors_keep_their_status() {
        let app = AppError::from(AssessmentError::NotCompleted { progress: 40 });
        assert!(app.to_string().contains("progress 40%"));
        assert_eq!(app.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
