//! Calendar date helpers shared by the store and the engine.
//!
//! Dates travel as `yyyy-MM-dd` strings on the wire and in the database.
//! Lexicographic order of that form equals chronological order, which the
//! store relies on for its `BETWEEN` range queries.

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration};

use crate::error::{ParseError, ParseResult};

/// The `yyyy-MM-dd` format used everywhere a date is serialized.
pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Maximum number of days a historical window may span.
pub const MAX_HISTORY_DAYS: u32 = 30;

/// Parse a `yyyy-MM-dd` string.
pub fn parse_date(s: &str) -> ParseResult<Date> {
    Date::parse(s, DATE_FORMAT).map_err(|_| ParseError::InvalidDate(s.to_string()))
}

/// Format a date as `yyyy-MM-dd`.
pub fn format_date(date: Date) -> String {
    // The format is infallible for dates in the supported year range.
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day()))
}

/// The closed window of historical dates ending yesterday.
///
/// Returns `[today - days, today - 1]` in ascending order. Today is never
/// part of the window since it is not yet history.
///
/// # Example
///
/// ```
/// use nimbus_types::dates::historical_window;
/// use time::macros::date;
///
/// let window = historical_window(date!(2024 - 03 - 10), 3);
/// assert_eq!(window, vec![date!(2024 - 03 - 07), date!(2024 - 03 - 08), date!(2024 - 03 - 09)]);
/// ```
pub fn historical_window(today: Date, days: u32) -> Vec<Date> {
    (1..=i64::from(days))
        .rev()
        .filter_map(|offset| today.checked_sub(Duration::days(offset)))
        .collect()
}

/// Format a date range label such as `2024-03-01..2024-03-07`.
pub fn range_label(start: Date, end: Date) -> String {
    format!("{}..{}", format_date(start), format_date(end))
}

/// Every date in `[start, end]`, ascending. Empty when `start > end`.
pub fn dates_in_range(start: Date, end: Date) -> Vec<Date> {
    let mut dates = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        dates.push(cursor);
        match cursor.next_day() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    dates
}
