#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Common types and utilities for the workflow orchestrator.
//!
//! This crate provides shared functionality across all orchestrator components:
//! the error taxonomy, domain-agnostic types (task/run identifiers, status
//! values), configuration loading, and logging/metrics setup.

pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};
pub use types::*;
