//! Human-readable durations for topology files ("500ms", "5s", "2m", "1h")

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse a duration string
///
/// Supported units: `ms`, `s`, `m`, `h`. Zero is allowed (a zero start period
/// disables the grace window). Values above one day are rejected.
///
/// # Returns
/// * `Some(Duration)` - Parsed duration
/// * `None` - Empty input, unknown unit, non-numeric value or out of range
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();

    if duration_str.is_empty() {
        return None;
    }

    let (number_str, unit) = if let Some(n) = duration_str.strip_suffix("ms") {
        (n, "ms")
    } else {
        let unit_len = duration_str.chars().last()?.len_utf8();
        duration_str.split_at(duration_str.len() - unit_len)
    };

    let number: u64 = number_str.parse().ok()?;

    let duration = match unit {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(number.checked_mul(60)?),
        "h" => Duration::from_secs(number.checked_mul(3600)?),
        _ => return None,
    };

    if duration > MAX_DURATION {
        return None;
    }

    Some(duration)
}

const MAX_DURATION: Duration = Duration::from_secs(86_400);

/// Serde adapter for `Duration` fields written as strings
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{}'", raw)))
}
