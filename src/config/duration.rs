//! Duration parsing for the polling intervals.

use anyhow::Context;

/// Parse a duration string like "1h", "30m", "300s", "300" into seconds.
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
pub fn parse_duration_to_secs(s: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    if let Some(num_str) = s.strip_suffix('h') {
        let hours: u64 = num_str
            .parse()
            .with_context(|| format!("Invalid hours value: {num_str}"))?;
        return Ok(hours * 3600);
    }
    if let Some(num_str) = s.strip_suffix('m') {
        let minutes: u64 = num_str
            .parse()
            .with_context(|| format!("Invalid minutes value: {num_str}"))?;
        return Ok(minutes * 60);
    }
    if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str
            .parse()
            .with_context(|| format!("Invalid seconds value: {num_str}"))?;
        return Ok(secs);
    }

    // No suffix - treat as seconds
    s.parse::<u64>()
        .with_context(|| format!("Invalid duration value: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration_to_secs("300").unwrap(), 300);
    }

    #[test]
    fn parses_suffixed_forms() {
        assert_eq!(parse_duration_to_secs("45s").unwrap(), 45);
        assert_eq!(parse_duration_to_secs("30m").unwrap(), 1800);
        assert_eq!(parse_duration_to_secs("2h").unwrap(), 7200);
        assert_eq!(parse_duration_to_secs(" 5m ").unwrap(), 300);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration_to_secs("").is_err());
        assert!(parse_duration_to_secs("abc").is_err());
        assert!(parse_duration_to_secs("1d").is_err());
    }
}
