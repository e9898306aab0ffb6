//! Route handlers.
//!
//! Handlers stay thin: they read the [`RequestContext`](crate::principal::RequestContext)
//! and cookies, call one component, and shape the response.

pub mod auth;
pub mod health;
pub mod me;
