//! Route handlers for the identity service.

pub mod auth;
pub mod health;
pub mod users;
