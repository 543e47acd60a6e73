//! Headless host for the Nimbus weather engine.
//!
//! This crate provides:
//! - An application context wiring the engine, store, location registry and
//!   background refresh with explicit dependencies
//! - TOML configuration with validation
//! - Host adapters for battery, connectivity and position
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/nimbus/nimbus.toml`:
//!
//! ```toml
//! [api]
//! base_url = "https://api.weatherapi.com"
//! api_key = "your-key"        # or NIMBUS_API_KEY
//!
//! [location]
//! default_query = "Delhi, India"
//! latitude = 59.91
//! longitude = 10.75
//!
//! [refresh]
//! normal_interval_mins = 15
//! low_battery_interval_mins = 20
//! ```

pub mod config;
pub mod context;
pub mod platform;

pub use config::{
    ApiConfig, Config, ConfigError, HistoryConfig, LocationConfig, RefreshConfig, StorageConfig,
    ValidationError,
};
pub use context::AppContext;
pub use platform::{ConfiguredPosition, SysfsBattery, TcpProbe};
