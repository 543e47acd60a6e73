//! Host adapters for the engine's platform collaborators.
//!
//! A headless host has no GPS and often no battery, so every adapter here
//! degrades to the engine's documented fallback: unknown battery counts as
//! full, unknown position resolves to the default place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use nimbus_core::{BatteryMonitor, Error, LocationProvider, NetworkMonitor, Position, Result};

/// Default sysfs directory listing power supplies.
pub const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Battery level from the Linux power-supply class.
///
/// Averages every supply whose `type` is `Battery`; hosts without one
/// report `None`.
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    root: PathBuf,
}

impl Default for SysfsBattery {
    fn default() -> Self {
        Self::new(POWER_SUPPLY_DIR)
    }
}

impl SysfsBattery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_supply(dir: &Path) -> Option<f32> {
        let kind = tokio::fs::read_to_string(dir.join("type")).await.ok()?;
        if kind.trim() != "Battery" {
            return None;
        }
        let capacity = tokio::fs::read_to_string(dir.join("capacity")).await.ok()?;
        let percent: f32 = capacity.trim().parse().ok()?;
        Some((percent / 100.0).clamp(0.0, 1.0))
    }
}

#[async_trait]
impl BatteryMonitor for SysfsBattery {
    async fn charge_fraction(&self) -> Option<f32> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No power supply info at {:?}: {}", self.root, e);
                return None;
            }
        };

        let mut levels = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(level) = Self::read_supply(&entry.path()).await {
                levels.push(level);
            }
        }

        if levels.is_empty() {
            None
        } else {
            Some(levels.iter().sum::<f32>() / levels.len() as f32)
        }
    }
}

/// Reachability via a bounded TCP connect to the weather service host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the host and port of `base_url`.
    pub fn for_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = reqwest::Url::parse(base_url)
            .map_err(|e| Error::invalid_config(format!("invalid URL '{}': {}", base_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_config(format!("URL '{}' has no host", base_url)))?;
        let port = url.port_or_known_default().unwrap_or(443);
        Ok(Self::new(host, port, timeout))
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl NetworkMonitor for TcpProbe {
    async fn is_connected(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} failed: {}", self.target(), e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out after {:?}", self.target(), self.timeout);
                false
            }
        }
    }
}

/// Position fixed in configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPosition {
    position: Option<Position>,
}

impl ConfiguredPosition {
    pub fn new(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        let position = match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
            (None, None) => None,
            _ => {
                warn!("Ignoring half-configured position");
                None
            }
        };
        Self { position }
    }
}

#[async_trait]
impl LocationProvider for ConfiguredPosition {
    async fn current_position(&self) -> Result<Position> {
        self.position
            .ok_or_else(|| Error::invalid_config("no fixed position configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supply(root: &Path, name: &str, kind: &str, capacity: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("type"), format!("{kind}\n")).unwrap();
        if let Some(capacity) = capacity {
            std::fs::write(dir.join("capacity"), format!("{capacity}\n")).unwrap();
        }
    }

    #[tokio::test]
    async fn test_battery_reads_capacity() {
        let dir = tempfile::tempdir().unwrap();
        supply(dir.path(), "AC", "Mains", None);
        supply(dir.path(), "BAT0", "Battery", Some("64"));

        let battery = SysfsBattery::new(dir.path());
        let level = battery.charge_fraction().await.unwrap();
        assert!((level - 0.64).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_battery_averages_multiple() {
        let dir = tempfile::tempdir().unwrap();
        supply(dir.path(), "BAT0", "Battery", Some("100"));
        supply(dir.path(), "BAT1", "Battery", Some("50"));

        let level = SysfsBattery::new(dir.path()).charge_fraction().await.unwrap();
        assert!((level - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_battery_unknown_without_supply() {
        let dir = tempfile::tempdir().unwrap();
        supply(dir.path(), "AC", "Mains", None);
        supply(dir.path(), "BAT0", "Battery", Some("garbage"));
        assert!(SysfsBattery::new(dir.path()).charge_fraction().await.is_none());
        assert!(
            SysfsBattery::new(dir.path().join("missing"))
                .charge_fraction()
                .await
                .is_none()
        );
    }

    #[test]
    fn test_probe_from_url() {
        let probe = TcpProbe::for_url("https://api.weatherapi.com", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.target(), "api.weatherapi.com:443");

        let probe = TcpProbe::for_url("http://localhost:8080/base", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.target(), "localhost:8080");

        assert!(TcpProbe::for_url("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_probe_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(probe.is_connected().await);

        drop(listener);
        assert!(!probe.is_connected().await);
    }

    #[tokio::test]
    async fn test_configured_position() {
        let fixed = ConfiguredPosition::new(Some(59.91), Some(10.75));
        assert_eq!(
            fixed.current_position().await.unwrap(),
            Position::new(59.91, 10.75)
        );
        assert_eq!(
            fixed.fresh_position().await.unwrap(),
            Position::new(59.91, 10.75)
        );

        assert!(ConfiguredPosition::new(None, None).current_position().await.is_err());
        assert!(ConfiguredPosition::new(Some(1.0), None).current_position().await.is_err());
    }
}
