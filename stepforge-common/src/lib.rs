//! # Stepforge Common Library
//!
//! Shared code for the stepforge service crates:
//! - Error types
//! - Configuration loading and volume folder resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
