//! Sweep Core
//!
//! Core domain types, traits, and error handling for Sweep.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the workspace resolver and the job executor.

pub mod error;
pub mod ids;
pub mod job;
pub mod ports;
pub mod repo;
pub mod search;
pub mod spec;
pub mod template;
pub mod workspace;

pub use error::{Error, Result};
pub use ids::*;
