//! Parser for duration strings such as `"2s"`, `"150ms"`, `"1m30s"` or
//! `"1.5h"`: a sequence of decimal numbers, each with a unit suffix.
//! Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare
//! `"0"` is also accepted. Negative durations are rejected.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("negative duration: {0}")]
    Negative(String),

    #[error("invalid duration: {0}")]
    Invalid(String),

    #[error("missing unit in duration: {0}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration out of range: {0}")]
    Overflow(String),
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let s = match s.strip_prefix('-') {
        Some(rest) if rest == "0" => return Ok(Duration::ZERO),
        Some(_) => return Err(DurationParseError::Negative(input.to_string())),
        None => s.strip_prefix('+').unwrap_or(s),
    };

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(DurationParseError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let (whole, frac, after_number) = split_number(rest)
            .ok_or_else(|| DurationParseError::Invalid(input.to_string()))?;

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let unit = &after_number[..unit_len];
        if unit.is_empty() {
            return Err(DurationParseError::MissingUnit(input.to_string()));
        }
        let per_unit = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, n)| *n)
            .ok_or_else(|| DurationParseError::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

        let overflow = || DurationParseError::Overflow(input.to_string());
        let whole_nanos = whole.checked_mul(per_unit).ok_or_else(overflow)?;
        let frac_nanos = fraction_nanos(frac, per_unit);
        total = total
            .checked_add(whole_nanos)
            .and_then(|t| t.checked_add(frac_nanos))
            .ok_or_else(overflow)?;

        rest = &after_number[unit_len..];
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| DurationParseError::Overflow(input.to_string()))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Split a leading `digits[.digits]` off `s`. At least one digit must appear
/// on one side of the dot.
fn split_number(s: &str) -> Option<(u128, &str, &str)> {
    let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (int_part, rest) = s.split_at(int_len);

    let (frac_part, rest) = match rest.strip_prefix('.') {
        Some(after_dot) => {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            after_dot.split_at(frac_len)
        }
        None => ("", rest),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let whole = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<u128>().ok()?
    };
    Some((whole, frac_part, rest))
}

fn fraction_nanos(frac: &str, per_unit: u128) -> u128 {
    let mut nanos = 0u128;
    let mut scale = per_unit;
    for digit in frac.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        nanos += u128::from(digit - b'0') * scale;
    }
    nanos
}
