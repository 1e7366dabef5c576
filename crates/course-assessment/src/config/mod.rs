//! Process configuration read from the environment (and `.env` when present).

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::assessment::scoring::ScoringConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_WRITE_RETRIES: u32 = 5;

/// Deployment stage. Unknown values fall back to development.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppEnvironment {
    #[default]
    Development,
    Test,
    Production,
}

impl FromStr for AppEnvironment {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub assessment: AssessmentConfig,
    /// JSON catalog and token table; the demo seed is served when unset.
    pub seed_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = optional("APP_ENV")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let port = match optional("APP_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            environment,
            server: ServerConfig {
                host: optional("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
            },
            telemetry: TelemetryConfig {
                log_level: optional("APP_LOG_LEVEL")
                    .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            },
            assessment: AssessmentConfig::from_env()?,
            seed_path: optional("APP_SEED_PATH").map(PathBuf::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `localhost` maps to the IPv4 loopback; anything else must be an IP literal.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse()
                .map_err(|source| ConfigError::InvalidHost {
                    host: self.host.clone(),
                    source,
                })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the assessment engines.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    pub scoring: ScoringConfig,
    /// Bounded retries for guarded writes that lose a race.
    pub write_retries: u32,
    /// Certificates expire this many days after issuance; `None` never expires.
    pub certificate_validity_days: Option<u32>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            write_retries: DEFAULT_WRITE_RETRIES,
            certificate_validity_days: None,
        }
    }
}

impl AssessmentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(weight) = parsed::<f64>("ASSESSMENT_QUIZ_WEIGHT")? {
            config.scoring.quiz_weight = non_negative("ASSESSMENT_QUIZ_WEIGHT", weight)?;
        }
        if let Some(weight) = parsed::<f64>("ASSESSMENT_ASSIGNMENT_WEIGHT")? {
            config.scoring.assignment_weight =
                non_negative("ASSESSMENT_ASSIGNMENT_WEIGHT", weight)?;
        }
        if let Some(cap) = parsed::<f64>("ASSESSMENT_LATE_PENALTY_CAP")? {
            config.scoring.late_penalty_cap = non_negative("ASSESSMENT_LATE_PENALTY_CAP", cap)?;
        }
        if let Some(retries) = parsed::<u32>("ASSESSMENT_WRITE_RETRIES")? {
            config.write_retries = retries;
        }
        if let Some(days) = parsed::<u32>("CERTIFICATE_VALIDITY_DAYS")? {
            config.certificate_validity_days = (days > 0).then_some(days);
        }
        Ok(config)
    }
}

/// Set and non-blank.
fn optional(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    optional(var)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber { var, value: raw })
        })
        .transpose()
}

fn non_negative(var: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16, got '{0}'")]
    InvalidPort(String),
    #[error("APP_HOST '{host}' is neither localhost nor an IP address")]
    InvalidHost {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{var} must be a non-negative number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("APP_SEED_PATH is required in production")]
    SeedPathRequired,
}
