//! Time types used across the Trail crates

use chrono::{DateTime as ChronoDateTime, NaiveDate, NaiveDateTime, Utc};

/// Canonical timestamp type for TIMESTAMPTZ columns and API payloads.
pub type UtcDateTime = ChronoDateTime<Utc>;

/// `DateTime<Utc>` that accepts the loose formats dashboards send.
///
/// Accepted inputs:
/// - `2024-01-15T14:30:00Z` / `2024-01-15T14:30:00+02:00` (RFC 3339)
/// - `2024-01-15T14:30:00` and `2024-01-15 14:30:00` (naive, assumed UTC)
/// - `2024-01-15` (start of day, UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime(pub UtcDateTime);

impl DateTime {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();

        if let Ok(dt) = input.parse::<UtcDateTime>() {
            return Some(DateTime(dt));
        }

        for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return Some(DateTime(naive.and_utc()));
            }
        }

        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| DateTime(naive.and_utc()))
    }
}
