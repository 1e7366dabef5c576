pub mod assessment;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod telemetry;
