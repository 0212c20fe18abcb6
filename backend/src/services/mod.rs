//! Business logic services.

pub mod auth_service;
pub mod metrics_service;
pub mod permission_service;
