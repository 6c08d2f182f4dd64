//! Parsing and formatting for the Wayback Machine's 14-digit capture
//! timestamps (`YYYYMMDDhhmmss`).

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use thiserror::Error;

const TIMESTAMP_LEN: usize = 14;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum Error {
    #[error("Invalid Wayback timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Parse a 14-digit Wayback timestamp into a UTC instant.
///
/// Some captures in the wild carry `00` for the day-of-month or month
/// field. Rather than reject these, they're clamped to the first valid
/// value (day 1 / month 1), matching what real CDX data requires.
pub fn parse(input: &str) -> Result<DateTime<Utc>, Error> {
    if input.len() != TIMESTAMP_LEN || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidTimestamp(input.to_string()));
    }

    let year: i32 = input[0..4].parse().map_err(|_| invalid(input))?;
    let month: u32 = input[4..6].parse().map_err(|_| invalid(input))?;
    let day: u32 = input[6..8].parse().map_err(|_| invalid(input))?;
    let hour: u32 = input[8..10].parse().map_err(|_| invalid(input))?;
    let minute: u32 = input[10..12].parse().map_err(|_| invalid(input))?;
    let second: u32 = input[12..14].parse().map_err(|_| invalid(input))?;

    let month = month.max(1);
    let day = day.max(1);

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| invalid(input))?;
    let naive = date
        .and_hms_opt(hour, minute, second)
        .ok_or_else(|| invalid(input))?;

    Ok(Utc.from_utc_datetime(&naive))
}

fn invalid(input: &str) -> Error {
    Error::InvalidTimestamp(input.to_string())
}

/// Format a UTC instant as a 14-digit Wayback timestamp.
pub fn format(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn round_trip() {
        let parsed = parse("20100304123045").unwrap();
        assert_eq!(format(&parsed), "20100304123045");
    }

    #[test]
    fn clamps_zero_day_and_month() {
        // S7: day 0, month 0 parses to 2010-01-01 00:00:00 UTC.
        let parsed = parse("20100000000000").unwrap();
        let expected = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2010, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(parse("2010030412304").is_err());
        assert!(parse("201003041230456").is_err());
    }

    #[test]
    fn rejects_non_digits() {
        assert!(parse("2010030412304x").is_err());
    }
}
