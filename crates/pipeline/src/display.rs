//! Progress shown to users while a job runs.
//!
//! Remote calls report no progress of their own, so a running job's bar is
//! advanced from elapsed time and capped short of completion. This is a
//! presentation estimate only; the registry stores real progress.

use storyreel_core::job::{GenerationJob, JobStatus, MAX_PROGRESS};
use storyreel_core::types::Timestamp;

/// Highest estimate shown before the job actually finishes.
const ESTIMATE_CAP: i64 = 95;

/// Estimated percent gained per 10 000 elapsed milliseconds.
const PERCENT_PER_10K_MS: i64 = 6;

/// Progress to display for `job` at `now`.
pub fn display_progress(job: &GenerationJob, now: Timestamp) -> u8 {
    match job.status {
        JobStatus::Success => MAX_PROGRESS,
        JobStatus::Running => {
            let Some(started_at) = job.started_at else {
                return job.progress;
            };
            let elapsed_ms = (now - started_at).num_milliseconds().max(0);
            let estimate = (elapsed_ms * PERCENT_PER_10K_MS / 10_000).max(i64::from(job.progress));
            // Bounded by the cap, so the cast cannot truncate.
            estimate.min(ESTIMATE_CAP) as u8
        }
        _ => job.progress,
    }
}
