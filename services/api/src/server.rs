use crate::cli::ServeArgs;
use crate::infra::{demo_seed, AppState, Seed};
use crate::routes::with_assessment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use course_assessment::assessment::{AssessmentService, TracingNotifier};
use course_assessment::clock::SystemClock;
use course_assessment::config::{AppConfig, AppEnvironment, ConfigError};
use course_assessment::error::AppError;
use course_assessment::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let seed = startup_seed(&config)?;
    let (store, authenticator) = seed.into_parts();

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(AssessmentService::new(
        Arc::new(store),
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
        config.assessment.clone(),
    ));

    let app = with_assessment_routes(service, Arc::new(authenticator))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "course assessment service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// The seed file when configured; otherwise the demo catalog, which production refuses.
fn startup_seed(config: &AppConfig) -> Result<Seed, AppError> {
    match &config.seed_path {
        Some(path) => {
            let seed = Seed::load(path)?;
            info!(
                path = %path.display(),
                courses = seed.courses.len(),
                quizzes = seed.quizzes.len(),
                assignments = seed.assignments.len(),
                tokens = seed.tokens.len(),
                "seed loaded"
            );
            Ok(seed)
        }
        None if config.environment == AppEnvironment::Production => {
            Err(ConfigError::SeedPathRequired.into())
        }
        None => {
            warn!("APP_SEED_PATH not set; serving the demo catalog and tokens");
            Ok(demo_seed(Utc::now()))
        }
    }
}
