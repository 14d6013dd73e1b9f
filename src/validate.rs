//! The five structural rules that make multi-resolution propagation
//! well-defined. Pure predicate: never touches a file.

use crate::error::{Result, WhisperError};
use crate::retention::ArchivePolicy;

/// Validates an archive list. The list need not already be sorted; this
/// sorts a copy ascending by `seconds_per_point` before checking the
/// rules below, matching the reference validator's behavior of
/// reporting on the sorted order.
pub fn validate_archive_list(policies: &[ArchivePolicy]) -> Result<()> {
    if policies.is_empty() {
        return Err(WhisperError::InvalidConfiguration(
            "archive list must not be empty".to_string(),
        ));
    }

    let mut sorted: Vec<ArchivePolicy> = policies.to_vec();
    sorted.sort_by_key(|p| p.seconds_per_point);

    for window in sorted.windows(2) {
        let (a, b) = (window[0], window[1]);

        if a.seconds_per_point == b.seconds_per_point {
            return Err(WhisperError::InvalidConfiguration(format!(
                "a whisper database may not be configured with two archives of the same precision ({}, {})",
                a.seconds_per_point, b.seconds_per_point
            )));
        }

        if b.seconds_per_point % a.seconds_per_point != 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "higher precision archives' precision must evenly divide all lower precision archives' precision ({}, {})",
                a.seconds_per_point, b.seconds_per_point
            )));
        }

        if a.retention() >= b.retention() {
            return Err(WhisperError::InvalidConfiguration(format!(
                "lower precision archives must cover larger time intervals than higher precision archives ({}, {})",
                a.retention(),
                b.retention()
            )));
        }

        let points_per_consolidation = b.seconds_per_point / a.seconds_per_point;
        if a.points < points_per_consolidation {
            return Err(WhisperError::InvalidConfiguration(format!(
                "each archive must have at least enough points to consolidate to the next archive ({} points, need {})",
                a.points, points_per_consolidation
            )));
        }
    }

    Ok(())
}
