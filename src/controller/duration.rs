//! # Duration Parsing
//!
//! Parses duration strings used in generator specs ("30s", "5m", "1h30m", "1.5h").

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse a duration string into `std::time::Duration`
///
/// Accepts one or more `<number><unit>` pairs, where unit is one of
/// ms, s, m, h or d and the number may carry a fraction.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let whole = Regex::new(r"^(\d+(\.\d+)?(ms|s|m|h|d))+$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;
    let part = Regex::new(r"(?P<number>\d+(?:\.\d+)?)(?P<unit>ms|s|m|h|d)")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let lower = duration_trimmed.to_lowercase();
    if !whole.is_match(&lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '30s', '5m', '1h30m')",
            duration_trimmed
        ));
    }

    let mut total = 0f64;
    for captures in part.captures_iter(&lower) {
        let number: f64 = captures["number"].parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{}': {}",
                &captures["number"],
                duration_trimmed,
                e
            )
        })?;
        let unit_seconds = match &captures["unit"] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => 86400.0,
        };
        total += number * unit_seconds;
    }

    if total <= 0.0 {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    Duration::try_from_secs_f64(total)
        .map_err(|e| anyhow::anyhow!("Duration '{}' out of range: {}", duration_trimmed, e))
}
