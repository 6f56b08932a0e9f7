//! Duration helpers.

use serde::Serializer;
use std::time::Duration;

/// Serialize a duration as whole milliseconds.
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Human-readable duration for terminal output ("850ms", "2.4s").
pub fn format_short(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", duration.as_secs_f32())
    }
}
