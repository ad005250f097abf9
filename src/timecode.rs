//! Trim offsets: `HH:MM:SS(.fff)`, `MM:SS` or plain seconds.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A `[start, end)` window in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Build a range, rejecting empty or inverted windows.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 {
            return Err(PipelineError::InvalidTimecode(format!(
                "range {start}..{end} is out of bounds"
            )));
        }
        if end <= start {
            return Err(PipelineError::InvalidTimecode(format!(
                "end ({end}s) must be after start ({start}s)"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both offsets and build a range.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_offset(start)?, parse_offset(end)?)
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Parse a time offset to seconds.
///
/// Accepts `SS(.fff)`, `MM:SS(.fff)` and `HH:MM:SS(.fff)`. Minutes and
/// seconds after a leading field must be below 60.
pub fn parse_offset(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let invalid = || PipelineError::InvalidTimecode(format!("'{input}'"));

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }

    let (fields, last) = parts.split_at(parts.len() - 1);
    let seconds: f64 = last[0].parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 || (!fields.is_empty() && seconds >= 60.0) {
        return Err(invalid());
    }

    let mut total = 0.0;
    for (i, field) in fields.iter().enumerate() {
        let value: u64 = field.parse().map_err(|_| invalid())?;
        // Minutes following an hours field are bounded
        if i > 0 && value >= 60 {
            return Err(invalid());
        }
        total = total * 60.0 + value as f64;
    }

    Ok(total * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse_offset("10").unwrap(), 10.0);
        assert_eq!(parse_offset(" 12.5 ").unwrap(), 12.5);
    }

    #[test]
    fn test_parse_clock_formats() {
        assert_eq!(parse_offset("00:00:10").unwrap(), 10.0);
        assert_eq!(parse_offset("01:02:03").unwrap(), 3723.0);
        assert_eq!(parse_offset("02:30").unwrap(), 150.0);
        assert_eq!(parse_offset("0:00:01.5").unwrap(), 1.5);
        assert_eq!(parse_offset("90:00").unwrap(), 5400.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_offset("").is_err());
        assert!(parse_offset("abc").is_err());
        assert!(parse_offset("1:2:3:4").is_err());
        assert!(parse_offset("00:61").is_err());
        assert!(parse_offset("00:75:00").is_err());
        assert!(parse_offset("-5").is_err());
    }

    #[test]
    fn test_range_validation() {
        let range = TimeRange::parse("00:00:10", "00:00:20").unwrap();
        assert_eq!(range.start, 10.0);
        assert_eq!(range.duration(), 10.0);

        assert!(TimeRange::parse("20", "10").is_err());
        assert!(TimeRange::parse("10", "10").is_err());
    }
}
