//! Route handlers, grouped by resource.

pub mod assistant;
pub mod auth;
pub mod health;
pub mod records;
pub mod summaries;
pub mod tables;
pub mod users;
