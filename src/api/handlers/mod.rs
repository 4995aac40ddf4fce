//! API handlers for Pragma.
//!
//! Handlers only see requests that already passed the middleware chain; they read the
//! caller and the effective school from [`RequestContext`](crate::api::context::RequestContext).

pub mod admin;
pub mod auth;
pub mod documents;
pub mod gates;
pub mod health;
pub mod me;
pub mod root;
pub mod verify;
