//! Saved locations and the query strings used as cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known id of the "use device position" pseudo-location.
pub const CURRENT_LOCATION_ID: &str = "current_location";

/// Display name of the current-location sentinel.
pub const CURRENT_LOCATION_NAME: &str = "Current Location";

/// Cache key for weather lookups.
///
/// Either a `"<lat>,<lon>"` pair resolved from the device position or a
/// free-form place name chosen by the user. Treated as opaque and
/// case-sensitive: `"Paris"` and `"paris"` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationQuery(String);

impl LocationQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    /// Build a coordinate query from a position.
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        Self(format!("{},{}", latitude, longitude))
    }

    /// Interpret the query as a coordinate pair, if it is one.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = self.0.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationQuery {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LocationQuery {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for LocationQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A location the user has added, or the current-location sentinel.
///
/// Values are immutable once created; only the registry's selection pointer
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLocation {
    pub id: String,
    pub name: String,
    pub query: LocationQuery,
    pub is_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl SavedLocation {
    /// Create a user location with a fresh random id.
    pub fn new(name: impl Into<String>, query: impl Into<LocationQuery>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            query: query.into(),
            is_current: false,
            latitude: None,
            longitude: None,
        }
    }

    /// Attach known coordinates.
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// The "use device position" sentinel.
    pub fn current_location() -> Self {
        Self {
            id: CURRENT_LOCATION_ID.to_string(),
            name: CURRENT_LOCATION_NAME.to_string(),
            query: LocationQuery::new(""),
            is_current: true,
            latitude: None,
            longitude: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == CURRENT_LOCATION_ID
    }
}
