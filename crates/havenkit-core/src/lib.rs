//! Core plugin system and shared HTTP types for the HavenKit console

pub mod error_builder;
pub mod plugin;
pub mod problemdetails;

pub use error_builder::ErrorBuilder;
pub use problemdetails::{Problem, ProblemDetails};

// Re-export external dependencies so downstream crates agree on versions
pub use anyhow;
pub use serde_json;
pub use thiserror;
pub use tracing;
