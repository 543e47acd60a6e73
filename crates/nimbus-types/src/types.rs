//! Wire model for the remote weather API.
//!
//! These structs mirror the JSON returned by the forecast and history
//! endpoints field for field, so that a payload decoded here and persisted
//! as JSON reads back deep-equal.

use serde::{Deserialize, Serialize};

use crate::dates;
use crate::error::{ParseError, ParseResult};

/// A decoded response from either the forecast or the history endpoint.
///
/// The forecast endpoint always fills `current`; the history endpoint never
/// does. [`crate::WeatherSnapshot`] turns that convention into a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherResponse {
    pub location: LocationInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Current>,
    pub forecast: Forecast,
}

/// Location metadata resolved by the upstream service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "tz_id")]
    pub timezone_id: String,
    pub localtime_epoch: i64,
    pub localtime: String,
}

/// Current conditions block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Current {
    pub last_updated_epoch: i64,
    pub last_updated: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub is_day: u8,
    pub condition: Condition,
    pub wind_mph: f64,
    pub wind_kph: f64,
    pub wind_degree: u16,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub pressure_in: f64,
    pub precip_mm: f64,
    pub precip_in: f64,
    pub humidity: u8,
    pub cloud: u8,
    #[serde(rename = "feelslike_c")]
    pub feels_like_c: f64,
    #[serde(rename = "feelslike_f")]
    pub feels_like_f: f64,
    pub vis_km: f64,
    pub vis_miles: f64,
    pub uv: f64,
    pub gust_mph: f64,
    pub gust_kph: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_quality: Option<AirQuality>,
}

/// Textual condition plus icon and numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub text: String,
    pub icon: String,
    pub code: u32,
}

/// Air quality block, present when `aqi=yes` was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub co: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
    #[serde(rename = "us-epa-index")]
    pub us_epa_index: u8,
    #[serde(rename = "gb-defra-index")]
    pub gb_defra_index: u8,
}

/// Ordered sequence of per-day entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(rename = "forecastday")]
    pub days: Vec<ForecastDay>,
}

/// One calendar day with summary, astronomy and hourly breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// Calendar date in `yyyy-MM-dd` form.
    pub date: String,
    pub date_epoch: i64,
    pub day: Day,
    pub astro: Astro,
    #[serde(rename = "hour")]
    pub hours: Vec<Hour>,
}

impl ForecastDay {
    /// Parse this entry's `date` field.
    pub fn calendar_date(&self) -> ParseResult<time::Date> {
        dates::parse_date(&self.date)
    }
}

/// Daily summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    #[serde(rename = "maxtemp_c")]
    pub max_temp_c: f64,
    #[serde(rename = "maxtemp_f")]
    pub max_temp_f: f64,
    #[serde(rename = "mintemp_c")]
    pub min_temp_c: f64,
    #[serde(rename = "mintemp_f")]
    pub min_temp_f: f64,
    #[serde(rename = "avgtemp_c")]
    pub avg_temp_c: f64,
    #[serde(rename = "avgtemp_f")]
    pub avg_temp_f: f64,
    #[serde(rename = "maxwind_mph")]
    pub max_wind_mph: f64,
    #[serde(rename = "maxwind_kph")]
    pub max_wind_kph: f64,
    #[serde(rename = "totalprecip_mm")]
    pub total_precip_mm: f64,
    #[serde(rename = "totalprecip_in")]
    pub total_precip_in: f64,
    #[serde(rename = "totalsnow_cm", default)]
    pub total_snow_cm: f64,
    #[serde(rename = "avgvis_km")]
    pub avg_vis_km: f64,
    #[serde(rename = "avgvis_miles")]
    pub avg_vis_miles: f64,
    #[serde(rename = "avghumidity")]
    pub avg_humidity: f64,
    #[serde(default)]
    pub daily_will_it_rain: u8,
    #[serde(default)]
    pub daily_chance_of_rain: u8,
    #[serde(default)]
    pub daily_will_it_snow: u8,
    #[serde(default)]
    pub daily_chance_of_snow: u8,
    pub condition: Condition,
    pub uv: f64,
}

/// Astronomical data for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Astro {
    pub sunrise: String,
    pub sunset: String,
    pub moonrise: String,
    pub moonset: String,
    pub moon_phase: String,
    /// The API reports this as a number on some plans and a string on others.
    pub moon_illumination: NumberOrString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_moon_up: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sun_up: Option<u8>,
}

/// One hourly entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hour {
    pub time_epoch: i64,
    pub time: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub is_day: u8,
    pub condition: Condition,
    pub wind_mph: f64,
    pub wind_kph: f64,
    pub wind_degree: u16,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub pressure_in: f64,
    pub precip_mm: f64,
    pub precip_in: f64,
    pub humidity: u8,
    pub cloud: u8,
    #[serde(rename = "feelslike_c")]
    pub feels_like_c: f64,
    #[serde(rename = "feelslike_f")]
    pub feels_like_f: f64,
    #[serde(default)]
    pub windchill_c: f64,
    #[serde(default)]
    pub windchill_f: f64,
    #[serde(default)]
    pub heatindex_c: f64,
    #[serde(default)]
    pub heatindex_f: f64,
    #[serde(default)]
    pub dewpoint_c: f64,
    #[serde(default)]
    pub dewpoint_f: f64,
    #[serde(default)]
    pub will_it_rain: u8,
    #[serde(default)]
    pub chance_of_rain: u8,
    #[serde(default)]
    pub will_it_snow: u8,
    #[serde(default)]
    pub chance_of_snow: u8,
    pub vis_km: f64,
    pub vis_miles: f64,
    pub gust_mph: f64,
    pub gust_kph: f64,
    pub uv: f64,
}

/// Either a bare number or a string, preserved as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl WeatherResponse {
    /// Dates of all forecast entries, in payload order.
    pub fn dates(&self) -> Vec<&str> {
        self.forecast.days.iter().map(|d| d.date.as_str()).collect()
    }

    /// Reject payloads whose day entries carry malformed dates.
    pub fn validate_dates(&self) -> ParseResult<()> {
        for day in &self.forecast.days {
            if dates::parse_date(&day.date).is_err() {
                return Err(ParseError::InvalidDate(day.date.clone()));
            }
        }
        Ok(())
    }
}
