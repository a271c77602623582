//! Calendar checks for stored timestamps.

use crate::error::{CodecError, CodecResult};
use bson::DateTime;
use chrono::{NaiveDate, SecondsFormat, TimeZone, Utc};

/// Creates a timestamp at midnight UTC of the given calendar day.
///
/// # Errors
///
/// Returns [`CodecError::InvalidDate`] for days that do not exist
/// (for example `2022-03-36`).
pub fn date_from_ymd(year: i32, month: u32, day: u32) -> CodecResult<DateTime> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| CodecError::invalid_date(format!("{year:04}-{month:02}-{day:02}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CodecError::invalid_date("midnight out of range"))?;
    Ok(DateTime::from_millis(
        Utc.from_utc_datetime(&midnight).timestamp_millis(),
    ))
}

/// Calendar helpers for [`bson::DateTime`].
///
/// A BSON timestamp can hold any `i64` millisecond count; only the ones
/// chrono can map to a calendar instant are valid dates.
pub trait DateTimeExt {
    /// Whether this timestamp names a real calendar instant.
    fn is_calendar_valid(&self) -> bool;

    /// RFC 3339 form with millisecond precision.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDate`] for invalid timestamps.
    fn to_rfc3339_millis(&self) -> CodecResult<String>;
}

impl DateTimeExt for DateTime {
    fn is_calendar_valid(&self) -> bool {
        chrono::DateTime::<Utc>::from_timestamp_millis(self.timestamp_millis()).is_some()
    }

    fn to_rfc3339_millis(&self) -> CodecResult<String> {
        let millis = self.timestamp_millis();
        chrono::DateTime::<Utc>::from_timestamp_millis(millis)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .ok_or_else(|| CodecError::invalid_date(format!("{millis} ms out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_day() {
        let dt = date_from_ymd(2000, 3, 31).unwrap();
        assert_eq!(dt.to_rfc3339_millis().unwrap(), "2000-03-31T00:00:00.000Z");
        assert!(dt.is_calendar_valid());
    }

    #[test]
    fn impossible_day_is_rejected() {
        assert!(date_from_ymd(2022, 3, 36).is_err());
        assert!(date_from_ymd(2021, 2, 29).is_err());
    }

    #[test]
    fn out_of_range_millis_are_invalid() {
        let dt = DateTime::from_millis(i64::MAX);
        assert!(!dt.is_calendar_valid());
        assert!(dt.to_rfc3339_millis().is_err());
    }

    #[test]
    fn ordering_follows_time() {
        let a = date_from_ymd(1989, 12, 31).unwrap();
        let b = date_from_ymd(1990, 1, 1).unwrap();
        assert!(a < b);
    }
}
