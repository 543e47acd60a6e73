//! Sample payloads for tests and offline demos.
//!
//! The values are plausible but synthetic; only the dates and the location
//! name vary between calls.

use crate::types::{
    AirQuality, Astro, Condition, Current, Day, Forecast, ForecastDay, Hour, LocationInfo,
    NumberOrString, WeatherResponse,
};

fn condition() -> Condition {
    Condition {
        text: "Partly cloudy".to_string(),
        icon: "//cdn.weatherapi.com/weather/64x64/day/116.png".to_string(),
        code: 1003,
    }
}

/// Location block named `name`.
pub fn location(name: &str) -> LocationInfo {
    LocationInfo {
        name: name.to_string(),
        region: "Delhi".to_string(),
        country: "India".to_string(),
        lat: 28.67,
        lon: 77.22,
        timezone_id: "Asia/Kolkata".to_string(),
        localtime_epoch: 1_709_280_000,
        localtime: "2024-03-01 13:30".to_string(),
    }
}

/// Current conditions block.
pub fn current() -> Current {
    Current {
        last_updated_epoch: 1_709_280_000,
        last_updated: "2024-03-01 13:30".to_string(),
        temp_c: 24.0,
        temp_f: 75.2,
        is_day: 1,
        condition: condition(),
        wind_mph: 6.9,
        wind_kph: 11.2,
        wind_degree: 300,
        wind_dir: "WNW".to_string(),
        pressure_mb: 1014.0,
        pressure_in: 29.94,
        precip_mm: 0.0,
        precip_in: 0.0,
        humidity: 38,
        cloud: 25,
        feels_like_c: 24.6,
        feels_like_f: 76.3,
        vis_km: 4.0,
        vis_miles: 2.0,
        uv: 6.0,
        gust_mph: 8.3,
        gust_kph: 13.4,
        air_quality: Some(AirQuality {
            co: 1028.0,
            no2: 40.1,
            o3: 90.1,
            so2: 14.3,
            pm2_5: 62.3,
            pm10: 81.5,
            us_epa_index: 3,
            gb_defra_index: 7,
        }),
    }
}

fn hour(date: &str, h: u8) -> Hour {
    Hour {
        time_epoch: 1_709_231_400 + i64::from(h) * 3600,
        time: format!("{} {:02}:00", date, h),
        temp_c: 18.0 + f64::from(h) / 2.0,
        temp_f: 64.4 + f64::from(h) * 0.9,
        is_day: u8::from((6..18).contains(&h)),
        condition: condition(),
        wind_mph: 4.0,
        wind_kph: 6.4,
        wind_degree: 280,
        wind_dir: "W".to_string(),
        pressure_mb: 1015.0,
        pressure_in: 29.97,
        precip_mm: 0.0,
        precip_in: 0.0,
        humidity: 50,
        cloud: 20,
        feels_like_c: 18.0,
        feels_like_f: 64.4,
        windchill_c: 18.0,
        windchill_f: 64.4,
        heatindex_c: 18.0,
        heatindex_f: 64.4,
        dewpoint_c: 8.0,
        dewpoint_f: 46.4,
        will_it_rain: 0,
        chance_of_rain: 0,
        will_it_snow: 0,
        chance_of_snow: 0,
        vis_km: 10.0,
        vis_miles: 6.0,
        gust_mph: 6.0,
        gust_kph: 9.7,
        uv: 1.0,
    }
}

/// One forecast day dated `date`, with three hourly entries.
pub fn day(date: &str) -> ForecastDay {
    ForecastDay {
        date: date.to_string(),
        date_epoch: 1_709_251_200,
        day: Day {
            max_temp_c: 27.4,
            max_temp_f: 81.3,
            min_temp_c: 13.2,
            min_temp_f: 55.8,
            avg_temp_c: 20.1,
            avg_temp_f: 68.2,
            max_wind_mph: 9.4,
            max_wind_kph: 15.1,
            total_precip_mm: 0.0,
            total_precip_in: 0.0,
            total_snow_cm: 0.0,
            avg_vis_km: 7.6,
            avg_vis_miles: 4.0,
            avg_humidity: 41.0,
            daily_will_it_rain: 0,
            daily_chance_of_rain: 0,
            daily_will_it_snow: 0,
            daily_chance_of_snow: 0,
            condition: condition(),
            uv: 5.0,
        },
        astro: Astro {
            sunrise: "06:45 AM".to_string(),
            sunset: "06:20 PM".to_string(),
            moonrise: "11:52 PM".to_string(),
            moonset: "10:29 AM".to_string(),
            moon_phase: "Waning Gibbous".to_string(),
            moon_illumination: NumberOrString::Number(72.0),
            is_moon_up: Some(0),
            is_sun_up: Some(1),
        },
        hours: [0, 12, 23].into_iter().map(|h| hour(date, h)).collect(),
    }
}

/// A response for "New Delhi" containing one day per entry in `dates`.
pub fn response(dates: &[&str], with_current: bool) -> WeatherResponse {
    named_response("New Delhi", dates, with_current)
}

/// Like [`response`] with a custom location name.
pub fn named_response(name: &str, dates: &[&str], with_current: bool) -> WeatherResponse {
    WeatherResponse {
        location: location(name),
        current: with_current.then(current),
        forecast: Forecast {
            days: dates.iter().map(|d| day(d)).collect(),
        },
    }
}
