pub mod alerts;
pub mod app;
pub mod attendance;
pub mod auth;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod passes;
pub mod schedule;
pub mod state;
pub mod storage;
