//! Core domain types for the storyreel generation stack.
//!
//! - [`job`]: the generation job model and its lifecycle rules.
//! - [`registry`]: the shared [`JobRegistry`](registry::JobRegistry) that
//!   owns every submitted job.
//! - [`shot_state`]: the synchronizer seam that mirrors job state onto
//!   per-shot "generating" flags and result history.
//! - [`failure`]: the failure taxonomy shared by every remote call.

pub mod error;
pub mod failure;
pub mod job;
pub mod registry;
pub mod shot_state;
pub mod types;
