// Common library for session notification scheduling, shared by the API and tests

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod history;
pub mod meeting_token;
pub mod models;
pub mod notifications;
pub mod push;
pub mod scheduler;
pub mod telemetry;
pub mod triggers;
