//! ISO-8601 duration parsing and formatting for record TTLs.
//!
//! The wire format is the ISO-8601 duration subset with fixed-length
//! designators: `PnW` or `PnDTnHnMnS` (each component optional, at least
//! one required). Calendar units -- years and months -- have no fixed
//! length and are rejected.

use std::time::Duration;

use thiserror::Error;

/// Seconds per designator unit.
const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_WEEK: u64 = 604_800;

/// Errors produced while parsing an ISO-8601 duration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TtlError {
    /// The string is not an ISO-8601 duration at all.
    #[error("malformed ISO-8601 duration: `{0}`")]
    Malformed(String),
    /// Years and months are not supported (no fixed length).
    #[error("calendar units (years/months) are not supported in `{0}`")]
    CalendarUnit(String),
    /// The duration parsed to zero seconds.
    #[error("duration `{0}` must be positive")]
    Zero(String),
}

/// Parses an ISO-8601 duration such as `PT1H`, `P2DT30M`, or `P1W`.
///
/// # Errors
///
/// Returns [`TtlError`] if the string is malformed, uses calendar units,
/// or parses to a zero-length duration.
pub fn parse_duration(input: &str) -> Result<Duration, TtlError> {
    let malformed = || TtlError::Malformed(input.to_string());

    let rest = input.strip_prefix('P').ok_or_else(malformed)?;
    if rest.is_empty() {
        return Err(malformed());
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if t.is_empty() => return Err(TtlError::Malformed(format!("{d}T"))),
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total_secs: u64 = 0;
    let mut saw_component = false;

    for (value, unit) in designators(date_part).map_err(|()| malformed())? {
        saw_component = true;
        let per_unit = match unit {
            'W' => SECS_PER_WEEK,
            'D' => SECS_PER_DAY,
            'Y' | 'M' => return Err(TtlError::CalendarUnit(input.to_string())),
            _ => return Err(malformed()),
        };
        total_secs = total_secs
            .checked_add(value.checked_mul(per_unit).ok_or_else(malformed)?)
            .ok_or_else(malformed)?;
    }

    if let Some(time_part) = time_part {
        for (value, unit) in designators(time_part).map_err(|()| malformed())? {
            saw_component = true;
            // Inside the T section `M` means minutes, not months.
            let per_unit = match unit {
                'H' => SECS_PER_HOUR,
                'M' => SECS_PER_MINUTE,
                'S' => 1,
                _ => return Err(malformed()),
            };
            total_secs = total_secs
                .checked_add(value.checked_mul(per_unit).ok_or_else(malformed)?)
                .ok_or_else(malformed)?;
        }
    }

    if !saw_component {
        return Err(malformed());
    }
    if total_secs == 0 {
        return Err(TtlError::Zero(input.to_string()));
    }
    Ok(Duration::from_secs(total_secs))
}

/// Formats a duration back into the canonical `PT...` wire form.
///
/// Seconds are decomposed greedily into days, hours, minutes, and seconds;
/// sub-second precision is dropped (TTLs are whole seconds on the wire).
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "PT0S".to_string();
    }

    let days = secs / SECS_PER_DAY;
    secs %= SECS_PER_DAY;
    let hours = secs / SECS_PER_HOUR;
    secs %= SECS_PER_HOUR;
    let minutes = secs / SECS_PER_MINUTE;
    secs %= SECS_PER_MINUTE;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 {
            out.push_str(&format!("{secs}S"));
        }
    }
    out
}

/// Splits a designator run like `2D` or `1H30M` into `(value, unit)` pairs.
fn designators(part: &str) -> Result<Vec<(u64, char)>, ()> {
    let mut out = Vec::new();
    let mut digits = String::new();
    for ch in part.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if ch.is_ascii_uppercase() {
            if digits.is_empty() {
                return Err(());
            }
            let value = digits.parse().map_err(|_| ())?;
            out.push((value, ch));
            digits.clear();
        } else {
            return Err(());
        }
    }
    // Trailing digits without a unit designator are malformed.
    if !digits.is_empty() {
        return Err(());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse_duration("PT1H").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_duration("PT2H").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("PT90S").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_duration("P2DT3H4M5S").unwrap(),
            Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)
        );
        assert_eq!(parse_duration("P1W").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("P3D").unwrap(), Duration::from_secs(3 * 86_400));
    }

    #[test]
    fn minutes_and_months_disambiguated_by_t_section() {
        // M before T would be months -> rejected; M after T is minutes.
        assert_eq!(parse_duration("PT5M").unwrap(), Duration::from_secs(300));
        assert!(matches!(
            parse_duration("P5M"),
            Err(TtlError::CalendarUnit(_))
        ));
        assert!(matches!(
            parse_duration("P1Y"),
            Err(TtlError::CalendarUnit(_))
        ));
    }

    #[test]
    fn rejects_malformed_inputs() {
        for bad in ["", "P", "PT", "1H", "PTH", "PT1", "PT1h", "P T1H", "PT1H2"] {
            assert!(
                matches!(parse_duration(bad), Err(TtlError::Malformed(_))),
                "expected malformed for {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_zero() {
        assert!(matches!(parse_duration("PT0S"), Err(TtlError::Zero(_))));
    }

    #[test]
    fn format_round_trips_parse() {
        for text in ["PT1H", "PT2H30M", "P2DT3H4M5S", "PT45S", "P3D"] {
            let parsed = parse_duration(text).unwrap();
            assert_eq!(parse_duration(&format_duration(parsed)).unwrap(), parsed);
        }
    }

    #[test]
    fn format_zero_is_pt0s() {
        assert_eq!(format_duration(Duration::ZERO), "PT0S");
    }

    #[test]
    fn weeks_format_as_days() {
        assert_eq!(format_duration(Duration::from_secs(604_800)), "P7D");
    }
}
