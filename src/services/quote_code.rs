//! Human-readable quote codes: `QT` + local date + daily sequence

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

pub const QUOTE_CODE_PREFIX: &str = "QT";

pub fn format_quote_code(date: NaiveDate, sequence: i64) -> String {
    format!("{}{}{:04}", QUOTE_CODE_PREFIX, date.format("%Y%m%d"), sequence)
}

/// Start of the current local day, as UTC
pub fn local_day_start(now: DateTime<Local>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        // Midnight skipped by a DST jump
        None => {
            let elapsed = chrono::Duration::seconds(i64::from(now.num_seconds_from_midnight()));
            (now - elapsed).with_timezone(&Utc)
        }
    }
}

/// Code for the next quote given how many were already created today
pub fn next_quote_code(now: DateTime<Local>, created_today: i64) -> String {
    format_quote_code(now.date_naive(), created_today + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_quote_code() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(format_quote_code(date, 1), "QT202503070001");
        assert_eq!(format_quote_code(date, 12345), "QT2025030712345");
    }

    #[test]
    fn test_next_quote_code_uses_count_plus_one() {
        let now = Local.with_ymd_and_hms(2025, 3, 7, 15, 30, 0).unwrap();
        assert_eq!(next_quote_code(now, 0), "QT202503070001");
        assert_eq!(next_quote_code(now, 9), "QT202503070010");
    }

    #[test]
    fn test_local_day_start() {
        let now = Local.with_ymd_and_hms(2025, 3, 7, 15, 30, 0).unwrap();
        let start = local_day_start(now);
        assert_eq!(start.with_timezone(&Local).date_naive(), now.date_naive());
        assert_eq!(start.with_timezone(&Local).hour(), 0);
    }
}
