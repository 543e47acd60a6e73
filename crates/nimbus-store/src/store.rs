//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use nimbus_types::dates::{format_date, parse_date};
use nimbus_types::{LocationQuery, SavedLocation, WeatherSnapshot};

use crate::error::{Error, Result};
use crate::models::{CacheStats, CurrentWeatherRecord, HistoricalWeatherRecord};
use crate::queries::HistoricalQuery;
use crate::schema;

/// SQLite-backed cache for weather snapshots, saved locations and
/// preferences.
///
/// All writes to a unique key are single-statement upserts, so concurrent
/// writers for the same key resolve as last-write-wins inside SQLite.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening weather cache at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Whether a table exists.
    ///
    /// Housekeeping checks this before touching a table so that it never
    /// races a schema that is still being created.
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        schema::table_exists(&self.conn, name)
    }

    /// Row counts across the cache tables.
    pub fn stats(&self) -> Result<CacheStats> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
            Ok(n as u64)
        };
        Ok(CacheStats {
            current_records: count("current_weather")?,
            historical_records: count("historical_weather")?,
            saved_locations: count("saved_locations")?,
        })
    }
}

// Current weather operations
impl Store {
    /// Store the latest snapshot for a query, replacing any previous one.
    pub fn upsert_current(
        &self,
        location_query: &LocationQuery,
        location_name: &str,
        snapshot: &WeatherSnapshot,
        timestamp: OffsetDateTime,
    ) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO current_weather
             (id, location_query, location_name, timestamp, weather_data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new_id(),
                location_query.as_str(),
                location_name,
                to_millis(timestamp),
                data
            ],
        )?;

        debug!("Stored current weather for '{}'", location_query);
        Ok(())
    }

    /// Get the stored snapshot for a query.
    pub fn get_current(&self, location_query: &LocationQuery) -> Result<Option<CurrentWeatherRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, location_query, location_name, timestamp, weather_data
                 FROM current_weather WHERE location_query = ?",
                [location_query.as_str()],
                RawCurrent::from_row,
            )
            .optional()?;

        raw.map(RawCurrent::into_record).transpose()
    }

    /// All current records, most recently fetched first.
    pub fn list_current(&self) -> Result<Vec<CurrentWeatherRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, location_query, location_name, timestamp, weather_data
             FROM current_weather ORDER BY timestamp DESC",
        )?;

        let rows = stmt
            .query_map([], RawCurrent::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawCurrent::into_record).collect()
    }

    /// Delete the current record for a query. Returns whether a row existed.
    pub fn delete_current(&self, location_query: &LocationQuery) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM current_weather WHERE location_query = ?",
            [location_query.as_str()],
        )?;
        Ok(n > 0)
    }
}

// Historical weather operations
impl Store {
    /// Store one historical day, replacing any previous row for the same
    /// `(date, location_query)`.
    pub fn upsert_historical(
        &self,
        date: Date,
        location_query: &LocationQuery,
        snapshot: &WeatherSnapshot,
        timestamp: OffsetDateTime,
    ) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO historical_weather
             (id, date, location_query, timestamp, weather_data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new_id(),
                format_date(date),
                location_query.as_str(),
                to_millis(timestamp),
                data
            ],
        )?;

        debug!(
            "Stored historical weather for '{}' on {}",
            location_query,
            format_date(date)
        );
        Ok(())
    }

    /// Get one historical day.
    pub fn get_historical(
        &self,
        date: Date,
        location_query: &LocationQuery,
    ) -> Result<Option<HistoricalWeatherRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, date, location_query, timestamp, weather_data
                 FROM historical_weather WHERE date = ?1 AND location_query = ?2",
                params![format_date(date), location_query.as_str()],
                RawHistorical::from_row,
            )
            .optional()?;

        raw.map(RawHistorical::into_record).transpose()
    }

    /// All stored days for a query with `start <= date <= end`, newest first.
    pub fn get_historical_in_range(
        &self,
        location_query: &LocationQuery,
        start: Date,
        end: Date,
    ) -> Result<Vec<HistoricalWeatherRecord>> {
        let query = HistoricalQuery::new()
            .location(location_query)
            .from(start)
            .to(end);
        self.query_historical(&query)
    }

    /// Query historical records with filters.
    pub fn query_historical(&self, query: &HistoricalQuery) -> Result<Vec<HistoricalWeatherRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), RawHistorical::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawHistorical::into_record).collect()
    }

    /// Evict historical rows fetched before `cutoff`. Returns the count removed.
    pub fn delete_historical_older_than(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM historical_weather WHERE timestamp < ?",
            [to_millis(cutoff)],
        )?;
        if n > 0 {
            info!("Evicted {} historical records", n);
        }
        Ok(n)
    }

    /// Delete every historical row for a query.
    pub fn delete_historical_for(&self, location_query: &LocationQuery) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM historical_weather WHERE location_query = ?",
            [location_query.as_str()],
        )?;
        Ok(n)
    }

    /// Count historical rows, optionally for one query.
    pub fn count_historical(&self, location_query: Option<&LocationQuery>) -> Result<u64> {
        let count: i64 = match location_query {
            Some(q) => self.conn.query_row(
                "SELECT COUNT(*) FROM historical_weather WHERE location_query = ?",
                [q.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM historical_weather", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Saved location operations
impl Store {
    /// All saved locations in insertion order.
    pub fn list_locations(&self) -> Result<Vec<SavedLocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, query, is_current, latitude, longitude
             FROM saved_locations ORDER BY position ASC",
        )?;

        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(locations)
    }

    pub fn get_location(&self, id: &str) -> Result<Option<SavedLocation>> {
        let location = self
            .conn
            .query_row(
                "SELECT id, name, query, is_current, latitude, longitude
                 FROM saved_locations WHERE id = ?",
                [id],
                location_from_row,
            )
            .optional()?;
        Ok(location)
    }

    /// Append a location. Returns `false` if the id already exists.
    pub fn insert_location(&self, location: &SavedLocation) -> Result<bool> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO saved_locations
             (id, name, query, is_current, latitude, longitude, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                     (SELECT COALESCE(MAX(position), 0) + 1 FROM saved_locations))",
            params![
                location.id,
                location.name,
                location.query.as_str(),
                location.is_current,
                location.latitude,
                location.longitude,
            ],
        )?;
        Ok(n > 0)
    }

    /// Delete a location by id.
    pub fn delete_location(&self, id: &str) -> Result<SavedLocation> {
        let location = self
            .get_location(id)?
            .ok_or_else(|| Error::LocationNotFound(id.to_string()))?;
        self.conn
            .execute("DELETE FROM saved_locations WHERE id = ?", [id])?;
        Ok(location)
    }
}

// Preference operations
impl Store {
    pub fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM preferences WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_preference(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM preferences WHERE key = ?", [key])?;
        Ok(())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch.
pub(crate) fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|_| Error::InvalidTimestamp(ms))
}

fn location_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SavedLocation> {
    Ok(SavedLocation {
        id: row.get(0)?,
        name: row.get(1)?,
        query: LocationQuery::new(row.get::<_, String>(2)?),
        is_current: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
    })
}

/// Columns as SQLite returns them, before JSON and timestamp decoding.
struct RawCurrent {
    id: String,
    location_query: String,
    location_name: String,
    timestamp: i64,
    weather_data: String,
}

impl RawCurrent {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            location_query: row.get(1)?,
            location_name: row.get(2)?,
            timestamp: row.get(3)?,
            weather_data: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<CurrentWeatherRecord> {
        Ok(CurrentWeatherRecord {
            id: self.id,
            location_query: LocationQuery::new(self.location_query),
            location_name: self.location_name,
            timestamp: from_millis(self.timestamp)?,
            weather_data: serde_json::from_str(&self.weather_data)?,
        })
    }
}

struct RawHistorical {
    id: String,
    date: String,
    location_query: String,
    timestamp: i64,
    weather_data: String,
}

impl RawHistorical {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            location_query: row.get(2)?,
            timestamp: row.get(3)?,
            weather_data: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<HistoricalWeatherRecord> {
        let date = parse_date(&self.date).map_err(|e| Error::CorruptRow {
            table: "historical_weather",
            reason: e.to_string(),
        })?;
        Ok(HistoricalWeatherRecord {
            id: self.id,
            date,
            location_query: LocationQuery::new(self.location_query),
            timestamp: from_millis(self.timestamp)?,
            weather_data: serde_json::from_str(&self.weather_data)?,
        })
    }
}
