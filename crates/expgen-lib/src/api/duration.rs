//! Duration strings (`1h30m`, `90s`, `500ms`)

use crate::error::{GenerationError, Result};
use chrono::Duration;

/// Parse a duration such as `2m30s`
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = |reason: String| GenerationError::InvalidApplication(format!("invalid duration {value:?}: {reason}"));

    let duration = humantime::parse_duration(value.trim()).map_err(|e| invalid(e.to_string()))?;
    Duration::from_std(duration).map_err(|e| invalid(e.to_string()))
}

/// Render whole seconds the way Go prints a duration (`1m30s`, `2h0m0s`)
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds();
    if seconds == 0 {
        return "0s".to_string();
    }
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    match (hours, minutes) {
        (0, 0) => format!("{secs}s"),
        (0, _) => format!("{minutes}m{secs}s"),
        _ => format!("{hours}h{minutes}m{secs}s"),
    }
}
