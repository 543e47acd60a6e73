//! HTTP client for the remote weather API.
//!
//! Talks to a WeatherAPI-compatible service exposing `v1/forecast.json` and
//! `v1/history.json`. Every request is bounded by the configured timeout.
//!
//! # Example
//!
//! ```no_run
//! use nimbus_core::client::WeatherApiClient;
//! use nimbus_core::WeatherApi;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WeatherApiClient::new("https://api.weatherapi.com", "my-key")?;
//!
//! let response = client.fetch_forecast(&"Delhi, India".into(), 7, true).await?;
//! println!("{} days for {}", response.forecast.days.len(), response.location.name);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::Date;
use tracing::debug;

use nimbus_types::dates::format_date;
use nimbus_types::{LocationQuery, WeatherResponse};

use crate::error::{Error, Result};
use crate::traits::WeatherApi;

/// Default request timeout applied to connect, read and write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the weather API.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

/// Error envelope returned by the API on 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u32>,
    message: String,
}

impl WeatherApiClient {
    /// Create a new client with the default timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Service root, e.g. `https://api.weatherapi.com`
    /// * `api_key` - Key sent as the `key` query parameter
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom timeout.
    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("nimbus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {}", e)))?;

        Self::with_client(base_url, api_key, client, timeout)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(
        base_url: &str,
        api_key: &str,
        client: Client,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            timeout,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<WeatherResponse> {
        let url = format!("{}/v1/{}", self.base_url, endpoint);
        debug!("GET {} ({} params)", url, params.len());

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| self.map_send_error(endpoint, e))?;

        self.handle_response(response).await
    }

    fn map_send_error(&self, endpoint: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::timeout(endpoint, self.timeout)
        } else {
            Error::Connectivity(err.to_string())
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<WeatherResponse> {
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await.map_err(Error::from)?;
            serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))
        } else {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .map(|env| match env.error.code {
                    Some(code) => format!("{} (code {})", env.error.message, code),
                    None => env.error.message,
                })
                .unwrap_or_else(|| status.to_string());

            Err(Error::Upstream {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl WeatherApi for WeatherApiClient {
    #[tracing::instrument(skip(self), fields(query = %query))]
    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        days: u32,
        include_air_quality: bool,
    ) -> Result<WeatherResponse> {
        let params = [
            ("q", query.as_str().to_string()),
            ("days", days.to_string()),
            ("aqi", yes_no(include_air_quality)),
            ("alerts", yes_no(false)),
        ];
        self.get("forecast.json", &params).await
    }

    #[tracing::instrument(skip(self), fields(query = %query))]
    async fn fetch_historical(
        &self,
        query: &LocationQuery,
        date: Date,
        end_date: Option<Date>,
    ) -> Result<WeatherResponse> {
        let mut params = vec![
            ("q", query.as_str().to_string()),
            ("dt", format_date(date)),
        ];
        if let Some(end) = end_date {
            params.push(("end_dt", format_date(end)));
        }
        params.push(("aqi", yes_no(true)));
        self.get("history.json", &params).await
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let base_url = base_url.trim_end_matches('/').to_string();

    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(Error::invalid_config(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }

    Ok(base_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = WeatherApiClient::new("https://api.weatherapi.com", "k").unwrap();
        assert_eq!(client.base_url(), "https://api.weatherapi.com");
    }

    #[test]
    fn test_client_normalizes_url() {
        let client = WeatherApiClient::new("http://localhost:8080/", "k").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = WeatherApiClient::new("api.weatherapi.com", "k");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_error_envelope_parses() {
        let json = r#"{"error":{"code":1006,"message":"No matching location found."}}"#;
        let env: ErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.error.code, Some(1006));
        assert_eq!(env.error.message, "No matching location found.");
    }
}
