//! CaseDesk - Backend Library
//!
//! Complaint tracking for a public works office with role-based access
//! control, session management, and SLA-driven due dates.

#[macro_use]
mod macros;

pub mod api;
pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
