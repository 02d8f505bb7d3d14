//! mailcraft Common - Shared types and configuration
//!
//! This crate provides the user/alias model, configuration loading
//! and the error type shared across all mailcraft components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{EmailAddress, Registry, User};
