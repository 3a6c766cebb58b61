//! Go `time.Duration` strings.
//!
//! cert-manager stores `duration` and `renewBefore` as Go duration strings,
//! so they are parsed with Go's grammar (`1h30m`, `1.5h`, `300ms`, `-2m`)
//! and written back in Go's canonical form (`2160h` becomes `2160h0m0s`).

use thiserror::Error;

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// Magnitude limit of an `i64` nanosecond count
const LIMIT: u64 = 1 << 63;

/// Duration string parse failure, worded like Go's `time.ParseDuration`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("time: invalid duration {0:?}")]
    Invalid(String),
    #[error("time: missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("time: unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(NANOSECOND),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        _ => None,
    }
}

/// Consumes leading digits. `None` on overflow.
fn leading_int(s: &[u8]) -> Option<(u64, &[u8])> {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut value: u64 = 0;
    for &c in &s[..end] {
        if value > (LIMIT - 1) / 10 {
            return None;
        }
        value = value * 10 + u64::from(c - b'0');
        if value > LIMIT {
            return None;
        }
    }
    Some((value, &s[end..]))
}

/// Consumes leading fraction digits, returning `(value, scale, rest)`.
/// Digits beyond what fits are dropped.
fn leading_fraction(s: &[u8]) -> (u64, f64, &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut value: u64 = 0;
    let mut scale = 1.0_f64;
    let mut overflow = false;
    for &c in &s[..end] {
        if overflow {
            continue;
        }
        if value > (LIMIT - 1) / 10 {
            overflow = true;
            continue;
        }
        let next = value * 10 + u64::from(c - b'0');
        if next > LIMIT {
            overflow = true;
            continue;
        }
        value = next;
        scale *= 10.0;
    }
    (value, scale, &s[end..])
}

/// Parses a Go duration string into signed nanoseconds.
pub fn parse_duration(input: &str) -> Result<i64, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());

    let mut s = input.as_bytes();
    let mut negative = false;
    if let Some(&sign) = s.first() {
        if sign == b'-' || sign == b'+' {
            negative = sign == b'-';
            s = &s[1..];
        }
    }
    if s == b"0" {
        return Ok(0);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        if !(s[0] == b'.' || s[0].is_ascii_digit()) {
            return Err(invalid());
        }

        let before = s.len();
        let (mut value, rest) = leading_int(s).ok_or_else(invalid)?;
        s = rest;
        let has_int = before != s.len();

        let mut fraction = 0;
        let mut scale = 1.0;
        let mut has_fraction = false;
        if s.first() == Some(&b'.') {
            s = &s[1..];
            let before = s.len();
            (fraction, scale, s) = leading_fraction(s);
            has_fraction = before != s.len();
        }
        if !has_int && !has_fraction {
            return Err(invalid());
        }

        let unit_end = s
            .iter()
            .position(|&c| c == b'.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if unit_end == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let unit = String::from_utf8_lossy(&s[..unit_end]).into_owned();
        s = &s[unit_end..];
        let unit = unit_nanos(&unit).ok_or_else(|| DurationError::UnknownUnit {
            unit,
            input: input.to_string(),
        })?;

        if value > LIMIT / unit {
            return Err(invalid());
        }
        value *= unit;
        if fraction > 0 {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss,
                reason = "fraction of one unit, always below the unit"
            )]
            let extra = (fraction as f64 * (unit as f64 / scale)) as u64;
            value = value.checked_add(extra).filter(|v| *v <= LIMIT).ok_or_else(invalid)?;
        }
        total = total.checked_add(value).filter(|t| *t <= LIMIT).ok_or_else(invalid)?;
    }

    if negative {
        // LIMIT itself is i64::MIN
        return Ok(0_i64.wrapping_sub_unsigned(total));
    }
    i64::try_from(total).map_err(|_| invalid())
}

/// Writes the fraction of `v` with `precision` digits, dropping trailing
/// zeros, and returns `v` with those digits removed.
fn format_fraction(out: &mut String, v: u64, precision: u32) -> u64 {
    let divisor = 10_u64.pow(precision);
    let fraction = v % divisor;
    if fraction != 0 {
        let digits = format!("{fraction:0width$}", width = precision as usize);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    v / divisor
}

/// Formats signed nanoseconds the way Go's `Duration.String` does.
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let mut u = nanos.unsigned_abs();

    // Built least significant part first, then reversed into place
    let mut parts: Vec<String> = Vec::new();
    if u < SECOND {
        let mut fraction = String::new();
        let (whole, unit) = if u < MICROSECOND {
            (u, "ns")
        } else if u < MILLISECOND {
            (format_fraction(&mut fraction, u, 3), "\u{b5}s")
        } else {
            (format_fraction(&mut fraction, u, 6), "ms")
        };
        parts.push(format!("{whole}{fraction}{unit}"));
    } else {
        let mut fraction = String::new();
        u = format_fraction(&mut fraction, u, 9);
        parts.push(format!("{}{fraction}s", u % 60));
        u /= 60;
        if u > 0 {
            parts.push(format!("{}m", u % 60));
            u /= 60;
            if u > 0 {
                parts.push(format!("{u}h"));
            }
        }
    }

    let mut out = String::new();
    if nanos < 0 {
        out.push('-');
    }
    for part in parts.iter().rev() {
        out.push_str(part);
    }
    out
}

/// Parses and re-formats a Go duration string.
pub fn normalize_duration(input: &str) -> Result<String, DurationError> {
    parse_duration(input).map(format_duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("0"), Ok(0));
        assert_eq!(parse_duration("5s"), Ok(5 * SECOND as i64));
        assert_eq!(parse_duration("1h30m"), Ok((HOUR + 30 * MINUTE) as i64));
        assert_eq!(parse_duration("1.5h"), Ok((HOUR + 30 * MINUTE) as i64));
        assert_eq!(parse_duration(".5s"), Ok(500 * MILLISECOND as i64));
        assert_eq!(parse_duration("-2m"), Ok(-2 * MINUTE as i64));
        assert_eq!(parse_duration("+10ms"), Ok(10 * MILLISECOND as i64));
        assert_eq!(parse_duration("3\u{b5}s"), Ok(3_000));
        assert_eq!(parse_duration("3us"), Ok(3_000));
        assert_eq!(parse_duration("1h1m1s1ms1us1ns"), Ok((HOUR + MINUTE + SECOND + MILLISECOND + MICROSECOND + 1) as i64));
    }

    #[test]
    fn test_parse_errors_match_go_wording() {
        assert_eq!(
            parse_duration("").unwrap_err().to_string(),
            "time: invalid duration \"\""
        );
        assert_eq!(
            parse_duration("abc").unwrap_err().to_string(),
            "time: invalid duration \"abc\""
        );
        assert_eq!(
            parse_duration("10").unwrap_err().to_string(),
            "time: missing unit in duration \"10\""
        );
        assert_eq!(
            parse_duration("10d").unwrap_err().to_string(),
            "time: unknown unit \"d\" in duration \"10d\""
        );
        assert_eq!(
            parse_duration(".h").unwrap_err().to_string(),
            "time: invalid duration \".h\""
        );
        assert!(matches!(parse_duration("9999999999999h"), Err(DurationError::Invalid(_))));
    }

    #[test]
    fn test_format_matches_go() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(1), "1ns");
        assert_eq!(format_duration(1_500), "1.5\u{b5}s");
        assert_eq!(format_duration(1_500_000), "1.5ms");
        assert_eq!(format_duration(90 * SECOND as i64), "1m30s");
        assert_eq!(format_duration(HOUR as i64), "1h0m0s");
        assert_eq!(format_duration(-(1_500 * MILLISECOND as i64)), "-1.5s");
        assert_eq!(format_duration(i64::MIN), "-2562047h47m16.854775808s");
        assert_eq!(format_duration(i64::MAX), "2562047h47m16.854775807s");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_duration("2160h").unwrap(), "2160h0m0s");
        assert_eq!(normalize_duration("1440h").unwrap(), "1440h0m0s");
        assert_eq!(normalize_duration("90m").unwrap(), "1h30m0s");
        assert_eq!(normalize_duration("0").unwrap(), "0s");
    }
}
