use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid interval {0:?}")]
    Invalid(String),
}

/// Bucket granularity. The unit letter is case-sensitive: `M` is month,
/// `m` is minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

/// A parsed interval specifier like `"15m"`, `"1h"`, `"1d"`, `"1w"`, `"1M"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec {
    pub multiplier: u32,
    pub unit: IntervalUnit,
}

static INTERVAL_PATTERN: OnceLock<Regex> = OnceLock::new();

impl IntervalSpec {
    /// Splits the numeric prefix from the unit suffix. A zero multiplier is
    /// rejected here so callers never step a cursor by nothing.
    pub fn parse(input: &str) -> Result<Self, IntervalError> {
        let pattern = INTERVAL_PATTERN
            .get_or_init(|| Regex::new(r"^([0-9]+)([mhdwM])$").expect("interval pattern is valid"));

        let captures = pattern
            .captures(input)
            .ok_or_else(|| IntervalError::Invalid(input.to_string()))?;

        let multiplier: u32 = captures[1]
            .parse()
            .map_err(|_| IntervalError::Invalid(input.to_string()))?;

        if multiplier == 0 {
            return Err(IntervalError::Invalid(input.to_string()));
        }

        let unit = match &captures[2] {
            "m" => IntervalUnit::Minute,
            "h" => IntervalUnit::Hour,
            "d" => IntervalUnit::Day,
            "w" => IntervalUnit::Week,
            "M" => IntervalUnit::Month,
            _ => unreachable!("pattern only admits mhdwM"),
        };

        Ok(Self { multiplier, unit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_intervals() {
        assert_eq!(
            IntervalSpec::parse("1h").unwrap(),
            IntervalSpec {
                multiplier: 1,
                unit: IntervalUnit::Hour
            }
        );
        assert_eq!(
            IntervalSpec::parse("15m").unwrap(),
            IntervalSpec {
                multiplier: 15,
                unit: IntervalUnit::Minute
            }
        );
        assert_eq!(
            IntervalSpec::parse("1d").unwrap(),
            IntervalSpec {
                multiplier: 1,
                unit: IntervalUnit::Day
            }
        );
        assert_eq!(
            IntervalSpec::parse("1w").unwrap(),
            IntervalSpec {
                multiplier: 1,
                unit: IntervalUnit::Week
            }
        );
    }

    #[test]
    fn test_unit_letter_is_case_sensitive() {
        assert_eq!(IntervalSpec::parse("1M").unwrap().unit, IntervalUnit::Month);
        assert_eq!(
            IntervalSpec::parse("1m").unwrap().unit,
            IntervalUnit::Minute
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(IntervalSpec::parse("").is_err());
        assert!(IntervalSpec::parse("h").is_err());
        assert!(IntervalSpec::parse("1").is_err());
        assert!(IntervalSpec::parse("1x").is_err());
        assert!(IntervalSpec::parse("h1").is_err());
        assert!(IntervalSpec::parse("1hh").is_err());
    }

    #[test]
    fn test_parse_rejects_zero_multiplier() {
        assert!(IntervalSpec::parse("0h").is_err());
        assert!(IntervalSpec::parse("0m").is_err());
    }
}
