//! HTTP request handlers.

pub mod auth;
pub mod complaints;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;
