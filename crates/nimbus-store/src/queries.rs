//! Query builder for historical weather records.
//!
//! [`HistoricalQuery`] follows the builder pattern: every filter is optional
//! and can be chained in any order.
//!
//! # Example
//!
//! ```
//! use nimbus_store::{HistoricalQuery, Store};
//! use time::macros::date;
//!
//! let store = Store::open_in_memory()?;
//!
//! // One week for a saved city, newest first
//! let query = HistoricalQuery::new()
//!     .location("Paris, France")
//!     .from(date!(2024 - 03 - 01))
//!     .to(date!(2024 - 03 - 07));
//! let records = store.query_historical(&query)?;
//! assert!(records.is_empty());
//! # Ok::<(), nimbus_store::Error>(())
//! ```

use time::{Date, OffsetDateTime};

use nimbus_types::dates::format_date;

/// Fluent query builder for historical records.
///
/// By default, results are ordered by `date` descending (newest first).
#[derive(Debug, Default, Clone)]
pub struct HistoricalQuery {
    /// Filter by location query.
    pub location_query: Option<String>,
    /// Include only dates on or after this day.
    pub from: Option<Date>,
    /// Include only dates on or before this day.
    pub to: Option<Date>,
    /// Include only records fetched before this instant.
    pub fetched_before: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by date descending.
    pub newest_first: bool,
}

impl HistoricalQuery {
    /// Create a new query: all locations, all dates, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by location query. Matching is exact and case-sensitive.
    pub fn location(mut self, query: impl AsRef<str>) -> Self {
        self.location_query = Some(query.as_ref().to_string());
        self
    }

    /// Include dates on or after `date`.
    pub fn from(mut self, date: Date) -> Self {
        self.from = Some(date);
        self
    }

    /// Include dates on or before `date`.
    pub fn to(mut self, date: Date) -> Self {
        self.to = Some(date);
        self
    }

    /// Include only rows fetched strictly before `instant`.
    pub fn fetched_before(mut self, instant: OffsetDateTime) -> Self {
        self.fetched_before = Some(instant);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results by date ascending.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref query) = self.location_query {
            conditions.push("location_query = ?");
            params.push(Box::new(query.clone()));
        }

        // yyyy-MM-dd compares lexicographically in date order
        if let Some(from) = self.from {
            conditions.push("date >= ?");
            params.push(Box::new(format_date(from)));
        }

        if let Some(to) = self.to {
            conditions.push("date <= ?");
            params.push(Box::new(format_date(to)));
        }

        if let Some(before) = self.fetched_before {
            conditions.push("timestamp < ?");
            params.push(Box::new(crate::store::to_millis(before)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, date, location_query, timestamp, weather_data \
             FROM historical_weather {} ORDER BY date {}",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_new_defaults() {
        let query = HistoricalQuery::new();
        assert!(query.location_query.is_none());
        assert!(query.from.is_none());
        assert!(query.to.is_none());
        assert!(query.limit.is_none());
        assert!(query.newest_first);
        assert!(!HistoricalQuery::default().newest_first);
    }

    #[test]
    fn test_build_where_empty() {
        let (clause, params) = HistoricalQuery::new().build_where();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_where_all_filters() {
        let query = HistoricalQuery::new()
            .location("London")
            .from(date!(2024 - 03 - 01))
            .to(date!(2024 - 03 - 07))
            .fetched_before(time::macros::datetime!(2024-03-08 00:00 UTC));
        let (clause, params) = query.build_where();
        assert_eq!(
            clause,
            "WHERE location_query = ? AND date >= ? AND date <= ? AND timestamp < ?"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_build_sql_order_and_limit() {
        let sql = HistoricalQuery::new().limit(5).build_sql();
        assert!(sql.contains("ORDER BY date DESC"));
        assert!(sql.ends_with("LIMIT 5"));

        let sql = HistoricalQuery::new().oldest_first().build_sql();
        assert!(sql.contains("ORDER BY date ASC"));
    }
}
