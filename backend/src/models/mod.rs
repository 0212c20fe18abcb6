//! Database models (SQLx).

pub mod complaint;
pub mod role;
pub mod session;
pub mod user;
