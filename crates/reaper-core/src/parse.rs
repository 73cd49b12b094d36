//! Scalar parsers for configuration values
//!
//! Absent keys resolve to a default. Present but malformed values are always
//! an error, with one exception: a negative integer for
//! [`parse_non_negative_int`] silently resolves to its default.

use crate::error::{PolicyError, Result};
use chrono::Duration;

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// Largest magnitude a duration may have before its sign is applied
const MAX_MAGNITUDE: u64 = 1 << 63;

/// Parse a duration, falling back to `default` when the key is absent
///
/// The default goes through the same grammar, so a bad default is an error
/// rather than a silent zero.
pub fn parse_duration(key: &str, raw: Option<&str>, default: &str) -> Result<Duration> {
    let value = raw.unwrap_or(default);
    duration_from_str(value).map_err(|reason| PolicyError::malformed_value(key, value, reason))
}

/// Parse an optional duration into whole seconds, truncated toward zero
///
/// Absent is `None`, which is distinct from an explicit zero.
pub fn parse_optional_seconds(key: &str, raw: Option<&str>) -> Result<Option<i64>> {
    match raw {
        None => Ok(None),
        Some(value) => {
            let duration = duration_from_str(value)
                .map_err(|reason| PolicyError::malformed_value(key, value, reason))?;
            Ok(Some(duration.num_seconds()))
        }
    }
}

/// Parse a boolean token, falling back to `default` when the key is absent
pub fn parse_bool(key: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    let Some(value) = raw else {
        return Ok(default);
    };

    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(PolicyError::malformed_value(
            key,
            value,
            format!("parsing {:?}: invalid syntax", value),
        )),
    }
}

/// Parse a decimal integer, falling back to `default` when the key is absent
///
/// Non-numeric input is an error. A negative number is not: it resolves to
/// `default`.
pub fn parse_non_negative_int(key: &str, raw: Option<&str>, default: usize) -> Result<usize> {
    let Some(value) = raw else {
        return Ok(default);
    };

    let parsed = value.parse::<i64>().map_err(|e| {
        PolicyError::malformed_value(key, value, format!("parsing {:?}: {}", value, e))
    })?;

    if parsed < 0 {
        return Ok(default);
    }

    usize::try_from(parsed).map_err(|e| {
        PolicyError::malformed_value(key, value, format!("parsing {:?}: {}", value, e))
    })
}

/// Parse a duration string such as `"300ms"`, `"-1.5h"` or `"2h45m"`
///
/// A duration is an optional sign followed by one or more decimal numbers,
/// each with an optional fraction and a unit suffix. Valid units are `ns`,
/// `us` (or `µs`), `ms`, `s`, `m` and `h`. The bare string `"0"` is also
/// accepted.
pub fn duration_from_str(input: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("invalid duration {:?}", input);

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !rest.is_empty() {
        let first = rest.as_bytes()[0];
        if first != b'.' && !first.is_ascii_digit() {
            return Err(invalid());
        }

        // Integer part
        let digits = leading_digits(rest);
        let has_int = !digits.is_empty();
        let mut whole: u64 = 0;
        for b in digits.bytes() {
            whole = whole
                .checked_mul(10)
                .and_then(|w| w.checked_add(u64::from(b - b'0')))
                .filter(|w| *w <= MAX_MAGNITUDE)
                .ok_or_else(invalid)?;
        }
        rest = &rest[digits.len()..];

        // Fraction part. Digits past u64 precision are consumed but ignored.
        let mut fraction: u64 = 0;
        let mut scale: f64 = 1.0;
        let mut has_fraction = false;
        if let Some(after_dot) = rest.strip_prefix('.') {
            let digits = leading_digits(after_dot);
            has_fraction = !digits.is_empty();
            let mut saturated = false;
            for b in digits.bytes() {
                if saturated {
                    continue;
                }
                match fraction
                    .checked_mul(10)
                    .and_then(|f| f.checked_add(u64::from(b - b'0')))
                    .filter(|f| *f <= MAX_MAGNITUDE)
                {
                    Some(f) => {
                        fraction = f;
                        scale *= 10.0;
                    }
                    None => saturated = true,
                }
            }
            rest = &after_dot[digits.len()..];
        }

        if !has_int && !has_fraction {
            return Err(invalid());
        }

        // Unit runs until the next digit or '.'
        let unit_len = rest
            .bytes()
            .position(|b| b == b'.' || b.is_ascii_digit())
            .unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(format!("missing unit in duration {:?}", input));
        }
        let unit_name = &rest[..unit_len];
        rest = &rest[unit_len..];

        let unit = unit_nanos(unit_name)
            .ok_or_else(|| format!("unknown unit {:?} in duration {:?}", unit_name, input))?;

        if whole > MAX_MAGNITUDE / unit {
            return Err(invalid());
        }
        let mut component = whole * unit;
        if fraction > 0 {
            component += (fraction as f64 * (unit as f64 / scale)) as u64;
            if component > MAX_MAGNITUDE {
                return Err(invalid());
            }
        }

        total = total
            .checked_add(component)
            .filter(|t| *t <= MAX_MAGNITUDE)
            .ok_or_else(invalid)?;
    }

    let nanos = if negative {
        if total == MAX_MAGNITUDE {
            i64::MIN
        } else {
            -(total as i64)
        }
    } else {
        i64::try_from(total).map_err(|_| invalid())?
    };

    Ok(Duration::nanoseconds(nanos))
}

/// Render a duration in the syntax accepted by [`duration_from_str`]
///
/// Durations under one second use the largest fitting sub-second unit
/// (`"1.5µs"`, `"300ms"`); longer ones use hours, minutes and seconds with
/// a trailing fraction (`"1h0m0s"`, `"2m3.5s"`). Zero is `"0s"`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = match duration.num_nanoseconds() {
        Some(n) => n,
        None if duration < Duration::zero() => i64::MIN,
        None => i64::MAX,
    };
    let sign = if nanos < 0 { "-" } else { "" };
    let magnitude = nanos.unsigned_abs();

    if magnitude == 0 {
        return "0s".to_string();
    }

    if magnitude < SECOND {
        return if magnitude < MICROSECOND {
            format!("{}{}ns", sign, magnitude)
        } else if magnitude < MILLISECOND {
            let (whole, frac) = split_fraction(magnitude, 3);
            format!("{}{}{}µs", sign, whole, frac)
        } else {
            let (whole, frac) = split_fraction(magnitude, 6);
            format!("{}{}{}ms", sign, whole, frac)
        };
    }

    let (total_seconds, frac) = split_fraction(magnitude, 9);
    let seconds = total_seconds % 60;
    let total_minutes = total_seconds / 60;
    let minutes = total_minutes % 60;
    let hours = total_minutes / 60;

    if hours > 0 {
        format!("{}{}h{}m{}{}s", sign, hours, minutes, seconds, frac)
    } else if total_minutes > 0 {
        format!("{}{}m{}{}s", sign, minutes, seconds, frac)
    } else {
        format!("{}{}{}s", sign, seconds, frac)
    }
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(NANOSECOND),
        // U+00B5 micro sign and U+03BC greek small letter mu
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        _ => None,
    }
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(s.len());
    &s[..end]
}

/// Split `value` into `value / 10^precision` and a `.ddd` suffix with
/// trailing zeros removed (empty when the fraction is zero)
fn split_fraction(value: u64, precision: u32) -> (u64, String) {
    let pow = 10u64.pow(precision);
    let fraction = value % pow;
    if fraction == 0 {
        return (value / pow, String::new());
    }
    let digits = format!("{:0width$}", fraction, width = precision as usize);
    (value / pow, format!(".{}", digits.trim_end_matches('0')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_units() {
        assert_eq!(duration_from_str("0").unwrap(), Duration::zero());
        assert_eq!(duration_from_str("0s").unwrap(), Duration::zero());
        assert_eq!(duration_from_str("300ms").unwrap(), Duration::milliseconds(300));
        assert_eq!(duration_from_str("1m").unwrap(), Duration::seconds(60));
        assert_eq!(
            duration_from_str("2h45m").unwrap(),
            Duration::minutes(2 * 60 + 45)
        );
        assert_eq!(duration_from_str("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(duration_from_str("-1.5h").unwrap(), Duration::minutes(-90));
        assert_eq!(duration_from_str("+10s").unwrap(), Duration::seconds(10));
        assert_eq!(duration_from_str(".5s").unwrap(), Duration::milliseconds(500));
        assert_eq!(duration_from_str("1us").unwrap(), Duration::microseconds(1));
        assert_eq!(duration_from_str("1µs").unwrap(), Duration::microseconds(1));
        assert_eq!(duration_from_str("1μs").unwrap(), Duration::microseconds(1));
        assert_eq!(duration_from_str("7ns").unwrap(), Duration::nanoseconds(7));
    }

    #[test]
    fn test_duration_rejects_malformed() {
        assert!(duration_from_str("").is_err());
        assert!(duration_from_str("-").is_err());
        assert!(duration_from_str("abc").is_err());
        assert!(duration_from_str(".s").is_err());
        assert!(duration_from_str("1 s").is_err());
        assert!(duration_from_str("3000000h").is_err()); // overflow

        let err = duration_from_str("10").unwrap_err();
        assert!(err.contains("missing unit"));

        let err = duration_from_str("10d").unwrap_err();
        assert!(err.contains("unknown unit \"d\""));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::zero()), "0s");
        assert_eq!(format_duration(Duration::nanoseconds(7)), "7ns");
        assert_eq!(format_duration(Duration::nanoseconds(1500)), "1.5µs");
        assert_eq!(format_duration(Duration::milliseconds(300)), "300ms");
        assert_eq!(format_duration(Duration::seconds(60)), "1m0s");
        assert_eq!(format_duration(Duration::minutes(90)), "1h30m0s");
        assert_eq!(format_duration(Duration::milliseconds(2500)), "2.5s");
        assert_eq!(format_duration(Duration::seconds(-5)), "-5s");
    }

    #[test]
    fn test_duration_round_trip() {
        for input in ["1h30m", "1m", "0s", "-1.5h", "2.25s", "300ms", "1.5µs", "42ns", "26h3m4.000005s"] {
            let parsed = duration_from_str(input).unwrap();
            let formatted = format_duration(parsed);
            assert_eq!(
                duration_from_str(&formatted).unwrap(),
                parsed,
                "round trip of {} through {}",
                input,
                formatted
            );
        }
    }

    #[test]
    fn test_parse_duration_defaults() {
        assert_eq!(
            parse_duration("RUN_DURATION", None, "0s").unwrap(),
            Duration::zero()
        );
        assert_eq!(
            parse_duration("RUN_DURATION", Some("5m"), "0s").unwrap(),
            Duration::minutes(5)
        );

        // A bad default is still an error
        let err = parse_duration("RUN_DURATION", None, "forever").unwrap_err();
        assert!(matches!(err, PolicyError::MalformedValue { .. }));

        let err = parse_duration("RUN_DURATION", Some("soon"), "0s").unwrap_err();
        assert!(err.to_string().starts_with("invalid RUN_DURATION:"));
    }

    #[test]
    fn test_parse_optional_seconds() {
        assert_eq!(parse_optional_seconds("GRACE_PERIOD", None).unwrap(), None);
        assert_eq!(
            parse_optional_seconds("GRACE_PERIOD", Some("0s")).unwrap(),
            Some(0)
        );
        assert_eq!(
            parse_optional_seconds("GRACE_PERIOD", Some("1m30s")).unwrap(),
            Some(90)
        );
        // Truncated toward zero
        assert_eq!(
            parse_optional_seconds("GRACE_PERIOD", Some("1.9s")).unwrap(),
            Some(1)
        );
        assert_eq!(
            parse_optional_seconds("GRACE_PERIOD", Some("-1.9s")).unwrap(),
            Some(-1)
        );
        assert!(parse_optional_seconds("GRACE_PERIOD", Some("later")).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(!parse_bool("DRY_RUN", None, false).unwrap());
        assert!(parse_bool("DRY_RUN", None, true).unwrap());
        assert!(parse_bool("DRY_RUN", Some("true"), false).unwrap());
        assert!(parse_bool("DRY_RUN", Some("T"), false).unwrap());
        assert!(parse_bool("DRY_RUN", Some("1"), false).unwrap());
        assert!(!parse_bool("DRY_RUN", Some("False"), true).unwrap());
        assert!(!parse_bool("DRY_RUN", Some("0"), true).unwrap());

        for bad in ["notabool", "yes", "tRUE", ""] {
            let err = parse_bool("DRY_RUN", Some(bad), false).unwrap_err();
            assert!(matches!(err, PolicyError::MalformedValue { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_parse_non_negative_int() {
        assert_eq!(parse_non_negative_int("MAX_PODS", None, 0).unwrap(), 0);
        assert_eq!(parse_non_negative_int("MAX_PODS", Some("7"), 0).unwrap(), 7);
        assert_eq!(parse_non_negative_int("MAX_PODS", Some("+7"), 0).unwrap(), 7);
        assert_eq!(parse_non_negative_int("MAX_PODS", Some("-5"), 0).unwrap(), 0);
        assert_eq!(parse_non_negative_int("MAX_PODS", Some("-0"), 0).unwrap(), 0);

        for bad in ["abc", "", "1.5", " 3", "99999999999999999999"] {
            let err = parse_non_negative_int("MAX_PODS", Some(bad), 0).unwrap_err();
            assert!(matches!(err, PolicyError::MalformedValue { .. }), "{}", bad);
        }
    }
}
