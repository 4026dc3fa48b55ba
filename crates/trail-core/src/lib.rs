//! Core types shared across the Trail crates

pub mod config;
pub mod error;
pub mod error_builder;
pub mod problemdetails;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_builder::*;
pub use problemdetails::Problem;
pub use types::*;

// Re-export external dependencies
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
