//! # AuthGate Core
//!
//! Core types and configuration for AuthGate.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Immutable token settings
//! - Principal and user profile types
//! - Redacting credential wrappers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod secrets;
pub mod types;

pub use config::{Config, ConfigError, TokenSettings};
pub use secrets::Password;
pub use types::{Principal, UserProfile, normalize_username};
