//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nimbus_core::{EngineOptions, RefreshPolicy, RetryConfig};
use nimbus_types::LocationQuery;
use nimbus_types::dates::MAX_HISTORY_DAYS;

/// Environment variable consulted when `api.api_key` is empty.
pub const API_KEY_ENV: &str = "NIMBUS_API_KEY";

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote weather service.
    pub api: ApiConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Location resolution.
    pub location: LocationConfig,
    /// Historical gap-fill.
    pub history: HistoryConfig,
    /// Background refresh.
    pub refresh: RefreshConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Fill the API key from [`API_KEY_ENV`] when the file leaves it empty.
    pub fn apply_env(&mut self) {
        if self.api.api_key.is_empty()
            && let Ok(key) = std::env::var(API_KEY_ENV)
        {
            self.api.api_key = key;
        }
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use nimbus_service::Config;
    ///
    /// let mut config = Config::default();
    /// config.api.api_key = "secret".to_string();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.api.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.location.validate());
        errors.extend(self.history.validate());
        errors.extend(self.refresh.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Runtime options for the weather engine.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            default_query: LocationQuery::new(self.location.default_query.clone()),
            lookup_timeout: Duration::from_secs(self.location.lookup_timeout_secs),
            forecast_days: self.api.forecast_days,
            air_quality: self.api.air_quality,
            retention: Duration::from_secs(u64::from(self.history.retention_days) * 24 * 60 * 60),
            request_spacing: Duration::from_millis(self.history.request_spacing_ms),
        }
    }

    /// Runtime policy for the background refresh job.
    pub fn refresh_policy(&self) -> RefreshPolicy {
        let defaults = RefreshPolicy::default();
        RefreshPolicy {
            normal_interval: Duration::from_secs(self.refresh.normal_interval_mins * 60),
            low_battery_interval: Duration::from_secs(self.refresh.low_battery_interval_mins * 60),
            low_battery_threshold: self.refresh.low_battery_threshold,
            network_poll: Duration::from_secs(self.refresh.network_poll_secs),
            retry: RetryConfig {
                max_retries: self.refresh.max_retries,
                ..defaults.retry
            },
        }
    }
}

/// Remote weather service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Service root (e.g., "https://api.weatherapi.com").
    pub base_url: String,
    /// API key; falls back to `NIMBUS_API_KEY`.
    pub api_key: String,
    /// Connect/read/write bound in seconds.
    pub timeout_secs: u64,
    /// Days of forecast to request.
    pub forecast_days: u32,
    /// Request the air quality block.
    pub air_quality: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.weatherapi.com".to_string(),
            api_key: String::new(),
            timeout_secs: 15,
            forecast_days: 7,
            air_quality: true,
        }
    }
}

impl ApiConfig {
    /// Validate API configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError::new(
                "api.base_url",
                format!(
                    "invalid URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            ));
        }
        if self.api_key.is_empty() {
            errors.push(ValidationError::new(
                "api.api_key",
                format!("API key is required (set it here or via {})", API_KEY_ENV),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            errors.push(ValidationError::new(
                "api.timeout_secs",
                format!("timeout {} must be between 1 and 120 seconds", self.timeout_secs),
            ));
        }
        if !(1..=14).contains(&self.forecast_days) {
            errors.push(ValidationError::new(
                "api.forecast_days",
                format!("forecast days {} must be between 1 and 14", self.forecast_days),
            ));
        }

        errors
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: nimbus_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Location resolution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Place used when the device position is unknown.
    pub default_query: String,
    /// Bound on a position lookup in seconds.
    pub lookup_timeout_secs: u64,
    /// Fixed latitude for the headless position provider.
    pub latitude: Option<f64>,
    /// Fixed longitude for the headless position provider.
    pub longitude: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_query: nimbus_core::DEFAULT_PLACE.to_string(),
            lookup_timeout_secs: 10,
            latitude: None,
            longitude: None,
        }
    }
}

impl LocationConfig {
    /// Validate location configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.default_query.trim().is_empty() {
            errors.push(ValidationError::new(
                "location.default_query",
                "default place cannot be empty",
            ));
        }
        if self.lookup_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "location.lookup_timeout_secs",
                "lookup timeout must be at least 1 second",
            ));
        }

        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    errors.push(ValidationError::new(
                        "location.latitude",
                        format!("latitude {} is outside -90..=90", lat),
                    ));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    errors.push(ValidationError::new(
                        "location.longitude",
                        format!("longitude {} is outside -180..=180", lon),
                    ));
                }
            }
            (None, None) => {}
            _ => errors.push(ValidationError::new(
                "location",
                "latitude and longitude must be set together",
            )),
        }

        errors
    }
}

/// Historical gap-fill configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Default window in days.
    pub days: u32,
    /// Age in days after which cached history is evicted.
    pub retention_days: u32,
    /// Delay between per-day requests in milliseconds.
    pub request_spacing_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            days: nimbus_core::DEFAULT_HISTORY_DAYS,
            retention_days: 30,
            request_spacing_ms: 500,
        }
    }
}

impl HistoryConfig {
    /// Validate history configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(1..=MAX_HISTORY_DAYS).contains(&self.days) {
            errors.push(ValidationError::new(
                "history.days",
                format!("history window {} must be between 1 and {}", self.days, MAX_HISTORY_DAYS),
            ));
        }
        if self.retention_days < self.days {
            errors.push(ValidationError::new(
                "history.retention_days",
                format!(
                    "retention {} days is shorter than the {}-day window",
                    self.retention_days, self.days
                ),
            ));
        }

        errors
    }
}

/// Minimum refresh interval in minutes.
pub const MIN_REFRESH_MINS: u64 = 15;
/// Maximum refresh interval in minutes (1 day).
pub const MAX_REFRESH_MINS: u64 = 24 * 60;

/// Background refresh configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub normal_interval_mins: u64,
    pub low_battery_interval_mins: u64,
    /// Charge fraction below which the low-battery interval applies.
    pub low_battery_threshold: f32,
    pub network_poll_secs: u64,
    pub max_retries: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            normal_interval_mins: 15,
            low_battery_interval_mins: 20,
            low_battery_threshold: 0.75,
            network_poll_secs: 30,
            max_retries: 3,
        }
    }
}

impl RefreshConfig {
    /// Validate refresh configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, mins) in [
            ("refresh.normal_interval_mins", self.normal_interval_mins),
            ("refresh.low_battery_interval_mins", self.low_battery_interval_mins),
        ] {
            if !(MIN_REFRESH_MINS..=MAX_REFRESH_MINS).contains(&mins) {
                errors.push(ValidationError::new(
                    field,
                    format!(
                        "interval {} must be between {} and {} minutes",
                        mins, MIN_REFRESH_MINS, MAX_REFRESH_MINS
                    ),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.low_battery_threshold) {
            errors.push(ValidationError::new(
                "refresh.low_battery_threshold",
                format!(
                    "threshold {} must be a fraction between 0 and 1",
                    self.low_battery_threshold
                ),
            ));
        }
        if self.network_poll_secs == 0 {
            errors.push(ValidationError::new(
                "refresh.network_poll_secs",
                "network poll must be at least 1 second",
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `api.base_url` or `refresh.max_retries`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nimbus")
        .join("nimbus.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.api.api_key = "test-key".to_string();
        config
    }

    fn fields(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://api.weatherapi.com");
        assert_eq!(config.location.default_query, "Delhi, India");
        assert_eq!(config.history.days, 7);
        assert_eq!(config.refresh.normal_interval_mins, 15);
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, nimbus_store::default_db_path());
    }

    #[test]
    fn test_default_config_needs_api_key() {
        assert_eq!(fields(Config::default().validate().unwrap_err()), vec!["api.api_key"]);
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [api]
            api_key = "abc"

            [history]
            days = 14
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.api_key, "abc");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.history.days, 14);
        assert_eq!(config.history.retention_days, 30);
        assert_eq!(config.refresh, RefreshConfig::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("nimbus.toml");

        let mut config = valid();
        config.storage.path = PathBuf::from("/tmp/weather.db");
        config.location.latitude = Some(59.91);
        config.location.longitude = Some(10.75);

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/nimbus.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_api_validation() {
        let mut config = valid();
        config.api.base_url = "ftp://weather".to_string();
        config.api.timeout_secs = 0;
        config.api.forecast_days = 15;
        assert_eq!(
            fields(config.validate().unwrap_err()),
            vec!["api.base_url", "api.timeout_secs", "api.forecast_days"]
        );
    }

    #[test]
    fn test_location_validation() {
        let mut config = valid();
        config.location.latitude = Some(91.0);
        config.location.longitude = Some(0.0);
        assert_eq!(fields(config.validate().unwrap_err()), vec!["location.latitude"]);

        config.location.latitude = Some(10.0);
        config.location.longitude = None;
        assert_eq!(fields(config.validate().unwrap_err()), vec!["location"]);
    }

    #[test]
    fn test_history_validation() {
        let mut config = valid();
        config.history.days = 31;
        assert!(fields(config.validate().unwrap_err()).contains(&"history.days".to_string()));

        config.history.days = 14;
        config.history.retention_days = 7;
        assert_eq!(
            fields(config.validate().unwrap_err()),
            vec!["history.retention_days"]
        );
    }

    #[test]
    fn test_refresh_validation() {
        let mut config = valid();
        config.refresh.normal_interval_mins = 5;
        config.refresh.low_battery_threshold = 1.5;
        assert_eq!(
            fields(config.validate().unwrap_err()),
            vec!["refresh.normal_interval_mins", "refresh.low_battery_threshold"]
        );
    }

    #[test]
    fn test_runtime_conversions() {
        let config = valid();
        let options = config.engine_options();
        assert_eq!(options, EngineOptions::default());

        let policy = config.refresh_policy();
        assert_eq!(policy.normal_interval, Duration::from_secs(900));
        assert_eq!(policy.low_battery_interval, Duration::from_secs(1200));
        assert_eq!(policy.retry.max_retries, 3);
        assert_eq!(policy, RefreshPolicy::default());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("nimbus/nimbus.toml"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigError::Validation(vec![
            ValidationError::new("api.api_key", "missing"),
            ValidationError::new("history.days", "too many"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("  - api.api_key: missing"));
        assert!(msg.contains("  - history.days: too many"));
    }
}
