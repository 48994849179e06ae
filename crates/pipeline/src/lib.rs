//! Orchestration of generation jobs.
//!
//! - [`config`]: environment configuration.
//! - [`runner`]: [`JobRunner`](runner::JobRunner), which turns generation
//!   calls into tracked jobs and keeps shot state in sync.
//! - [`service`]: [`GenerationService`](service::GenerationService), the
//!   calls themselves.
//! - [`display`]: elapsed-time progress estimate for display.

pub mod config;
pub mod display;
pub mod error;
pub mod runner;
pub mod service;
