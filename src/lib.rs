//! warden: lifecycle and health gating for the auth API service
//!
//! The crate ships two processes:
//! - `warden` - the API process, exposing the health endpoint the supervisor polls
//! - `warden-supervisor` - starts the database and the API in dependency order,
//!   gates the API on database readiness and restarts unhealthy services

pub mod config;
pub mod cron;
pub mod health;
pub mod lifecycle;
pub mod preflight;
pub mod server;
pub mod telemetry;
