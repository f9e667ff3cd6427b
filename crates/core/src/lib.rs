#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! DAG model, validator, run planner and persistence contract for the
//! workflow orchestrator.
//!
//! This crate defines the core abstractions consumed by
//! `orchestrator-engine`: the DAG/task data model and validation (§4.A),
//! the run planner that turns a DAG into queueable payloads (§4.B), and
//! the `Persistence` trait (§4.C) that both the in-memory and remote
//! backends implement.

pub mod dag;
pub mod persistence;
pub mod plan;
pub mod util;

pub use dag::{Dag, Task};
pub use persistence::Persistence;
pub use plan::{build_run_tasks, canonical_status_key, task_run_id, TaskRunPayload};
