//! Indian Standard Time helpers

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

/// IST is UTC+05:30 with no daylight saving
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// The IST offset
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in IST
pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

/// Calendar date in IST for an instant
pub fn ist_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&ist()).date_naive()
}

/// Render an instant the way every response shows it
pub fn format_ist(at: DateTime<FixedOffset>) -> String {
    at.with_timezone(&ist())
        .format("%Y-%m-%d %H:%M:%S IST")
        .to_string()
}

/// Upstox access tokens stop working at 03:30 IST the day after issue.
///
/// Returns the first 03:30 IST strictly after `issued_at`.
pub fn token_expiry(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    let offset = ist();
    let local = issued_at.with_timezone(&offset);
    let cutoff = NaiveTime::from_hms_opt(3, 30, 0).unwrap_or(NaiveTime::MIN);

    let mut date = local.date_naive();
    if local.time() >= cutoff {
        date = date.checked_add_days(Days::new(1)).unwrap_or(date);
    }

    offset
        .from_local_datetime(&date.and_time(cutoff))
        .single()
        .map_or(issued_at, |dt| dt.with_timezone(&Utc))
}

/// Market close (15:30 IST) on a trading date
pub fn market_close(date: NaiveDate) -> DateTime<FixedOffset> {
    let offset = ist();
    let close = NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN);
    offset
        .from_local_datetime(&date.and_time(close))
        .single()
        .unwrap_or_else(|| Utc::now().with_timezone(&offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_token_issued_during_day_expires_next_morning() {
        // 10:00 IST on 1 May
        let expiry = token_expiry(utc("2024-05-01T04:30:00Z"));
        assert_eq!(expiry, utc("2024-05-01T22:00:00Z")); // 03:30 IST 2 May
    }

    #[test]
    fn test_token_issued_after_midnight_expires_same_morning() {
        // 01:00 IST on 2 May
        let expiry = token_expiry(utc("2024-05-01T19:30:00Z"));
        assert_eq!(expiry, utc("2024-05-01T22:00:00Z"));
    }

    #[test]
    fn test_format_ist() {
        let at = utc("2024-05-01T10:00:00Z").with_timezone(&ist());
        assert_eq!(format_ist(at), "2024-05-01 15:30:00 IST");
    }

    #[test]
    fn test_ist_date_rolls_over_before_utc() {
        // 20:00 UTC is 01:30 IST next day
        assert_eq!(
            ist_date(utc("2024-05-01T20:00:00Z")),
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
    }
}
