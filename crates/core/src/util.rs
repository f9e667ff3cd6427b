//! Small helpers shared by the scheduler, worker, and executor.
//!
//! Ported in semantics from `original_source/orchestrator/utils.py`.

use std::time::Duration;

/// Exponential backoff delay for a given (zero-indexed) attempt: `2 * 2^attempt`.
#[must_use]
pub fn retry_backoff(attempt: u32) -> Duration {
    let secs = 2.0 * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(secs)
}

/// Format a duration as `Nh Mm S.mmms`, eliding zero components below the
/// largest non-zero unit.
#[must_use]
pub fn human_readable_duration(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs_f64();
    let hours = (total_secs / 3600.0) as u64;
    let minutes = ((total_secs % 3600.0) / 60.0) as u64;
    let rem = total_secs % 60.0;

    if hours > 0 {
        format!("{hours}h {minutes}m {rem:.3}s")
    } else if minutes > 0 {
        format!("{minutes}m {rem:.3}s")
    } else {
        format!("{rem:.3}s")
    }
}
