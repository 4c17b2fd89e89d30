//! Retention period conversion.
//!
//! Table retention is configured as a human-readable duration (`30d`, `720h`,
//! `1h30m`) and rendered into the schema files as a ClickHouse interval
//! constructor such as `toIntervalDay(30)`.

use crate::{Result, error::SeedError};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_DAY: u64 = 86_400;

/// Day counts: a bare non-negative integer followed by `d`.
fn day_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]+)d$").expect("Invalid day pattern"))
}

/// Parses a retention duration.
///
/// Accepts `<N>d` for whole days, otherwise a compound duration made of
/// `<number><unit>` pairs with units `h`, `m`, `s`, `ms`, `us` and `ns`
/// (e.g. `1h30m`, `1.5h`, `3600s`).
///
/// # Errors
/// Returns a conversion error for empty input, a day suffix without a
/// whole-number count (`d`, `12.5d`), negative durations and any token that is
/// not a number followed by a known unit.
pub fn parse_ttl(input: &str) -> Result<Duration> {
    if input.is_empty() {
        return Err(SeedError::conversion(input, "empty duration"));
    }

    if input.ends_with('d') {
        let captures = day_pattern().captures(input).ok_or_else(|| {
            SeedError::conversion(input, "day count must be a whole, non-negative number")
        })?;
        let days: u64 = captures[1]
            .parse()
            .map_err(|_| SeedError::conversion(input, "day count out of range"))?;
        let secs = days
            .checked_mul(SECS_PER_DAY)
            .ok_or_else(|| SeedError::conversion(input, "day count out of range"))?;
        return Ok(Duration::from_secs(secs));
    }

    parse_compound(input).map_err(|reason| SeedError::conversion(input, reason))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60_000_000_000),
        "h" => Some(3_600_000_000_000),
        _ => None,
    }
}

/// Compound `<number><unit>...` grammar with an optional leading sign.
fn parse_compound(input: &str) -> std::result::Result<Duration, String> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err("missing number".to_string());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(format!("expected a number at {rest:?}"));
        }

        let unit_len = after_number
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map_or(after_number.len(), |(idx, _)| idx);
        let (unit, remainder) = after_number.split_at(unit_len);
        if unit.is_empty() {
            let number = rest.get(..rest.len().saturating_sub(after_number.len())).unwrap_or(rest);
            return Err(format!("missing unit after {number}"));
        }
        let scale = unit_nanos(unit).ok_or_else(|| format!("unknown unit {unit:?}"))?;

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits
                .parse()
                .map_err(|_| "number out of range".to_string())?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| "duration out of range".to_string())?;

        // Fractions beyond nanosecond precision are truncated.
        let frac_digits = &frac_digits[..frac_digits.len().min(20)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits
                .parse()
                .map_err(|_| "number out of range".to_string())?;
            let denominator = 10u128.pow(u32::try_from(frac_digits.len()).unwrap_or(20));
            let fraction = numerator
                .saturating_mul(scale)
                .checked_div(denominator)
                .unwrap_or_default();
            nanos = nanos.saturating_add(fraction);
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| "duration out of range".to_string())?;
        rest = remainder;
    }

    if negative && total > 0 {
        return Err("duration must not be negative".to_string());
    }

    let nanos = u64::try_from(total).map_err(|_| "duration out of range".to_string())?;
    Ok(Duration::from_nanos(nanos))
}

/// Unit of a ClickHouse interval constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Day,
    Hour,
    Minute,
    Second,
}

impl IntervalUnit {
    /// Seconds in one unit.
    pub const fn seconds(self) -> u64 {
        match self {
            Self::Day => SECS_PER_DAY,
            Self::Hour => SECS_PER_HOUR,
            Self::Minute => SECS_PER_MINUTE,
            Self::Second => 1,
        }
    }

    /// ClickHouse function that builds an interval of this unit.
    pub const fn function(self) -> &'static str {
        match self {
            Self::Day => "toIntervalDay",
            Self::Hour => "toIntervalHour",
            Self::Minute => "toIntervalMinute",
            Self::Second => "toIntervalSecond",
        }
    }
}

/// A rendered interval such as `toIntervalDay(30)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalLiteral {
    pub unit: IntervalUnit,
    pub count: u64,
}

impl IntervalLiteral {
    /// Picks the coarsest unit that represents `duration` exactly.
    ///
    /// # Errors
    /// Fails for zero durations and durations with a sub-second remainder.
    pub fn from_duration(duration: Duration) -> std::result::Result<Self, String> {
        if duration.is_zero() {
            return Err("duration must be positive".to_string());
        }
        if duration.subsec_nanos() != 0 {
            return Err("duration must be a whole number of seconds".to_string());
        }

        let secs = duration.as_secs();
        let unit = [
            IntervalUnit::Day,
            IntervalUnit::Hour,
            IntervalUnit::Minute,
            IntervalUnit::Second,
        ]
        .into_iter()
        .find(|unit| secs.checked_rem(unit.seconds()) == Some(0))
        .unwrap_or(IntervalUnit::Second);

        Ok(Self {
            unit,
            count: secs.checked_div(unit.seconds()).unwrap_or(secs),
        })
    }
}

impl fmt::Display for IntervalLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.unit.function(), self.count)
    }
}

/// Converts a retention duration string into an interval literal.
///
/// # Example
/// ```rust
/// use chseed_core::ttl::to_interval_literal;
///
/// assert_eq!(to_interval_literal("720h")?.to_string(), "toIntervalDay(30)");
/// assert_eq!(to_interval_literal("36h")?.to_string(), "toIntervalHour(36)");
/// # Ok::<(), chseed_core::SeedError>(())
/// ```
///
/// # Errors
/// Returns a conversion error if the string does not parse or the duration is
/// not strictly positive.
pub fn to_interval_literal(input: &str) -> Result<IntervalLiteral> {
    let duration = parse_ttl(input)?;
    IntervalLiteral::from_duration(duration).map_err(|reason| SeedError::conversion(input, reason))
}
