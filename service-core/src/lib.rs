//! Shared platform crate for the association services.
//!
//! Provides the error taxonomy, base configuration loading, logging
//! bootstrap, and rate-limit middleware used by every service.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use error::{AppError, SecurityViolation};
