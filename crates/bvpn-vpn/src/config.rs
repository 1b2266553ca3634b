//! Application Configuration
//!
//! Loaded from TOML or JSON. Every field has a default so a partial file
//! (or none at all) still yields a usable configuration.
//!
//! ```toml
//! debug = true
//! log_level = "debug"
//!
//! [ads]
//! interstitial_unit_id = "ca-app-pub-3116534589278613/4897546375"
//! load_timeout_secs = 30
//!
//! [map]
//! zoom = 9.0
//! camera_duration_ms = 2000
//! ```

use bvpn_core::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Interstitial ad configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdConfig {
    /// Production interstitial unit
    #[serde(default = "default_interstitial_unit")]
    pub interstitial_unit_id: String,
    /// Vendor test unit, used in debug builds
    #[serde(default = "default_test_unit")]
    pub test_unit_id: String,
    /// Watchdog for the load callback (`None` = wait for the vendor)
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: Option<u64>,
    /// Watchdog for the show/dismiss callback
    #[serde(default = "default_show_timeout")]
    pub show_timeout_secs: Option<u64>,
}

fn default_interstitial_unit() -> String {
    "ca-app-pub-3116534589278613/4897546375".to_string()
}

fn default_test_unit() -> String {
    "ca-app-pub-3940256099942544/1033173712".to_string()
}

fn default_load_timeout() -> Option<u64> {
    Some(30)
}

fn default_show_timeout() -> Option<u64> {
    Some(600)
}

impl Default for AdConfig {
    fn default() -> Self {
        Self {
            interstitial_unit_id: default_interstitial_unit(),
            test_unit_id: default_test_unit(),
            load_timeout_secs: default_load_timeout(),
            show_timeout_secs: default_show_timeout(),
        }
    }
}

impl AdConfig {
    /// Unit to request for this build
    pub fn unit_id(&self, debug: bool) -> &str {
        if debug {
            &self.test_unit_id
        } else {
            &self.interstitial_unit_id
        }
    }

    /// Callback watchdogs
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            load_timeout: self.load_timeout_secs.map(Duration::from_secs),
            show_timeout: self.show_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Dashboard map camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default = "default_camera_duration")]
    pub camera_duration_ms: u64,
}

fn default_zoom() -> f64 {
    9.0
}

fn default_camera_duration() -> u64 {
    2000
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom: default_zoom(),
            camera_duration_ms: default_camera_duration(),
        }
    }
}

impl MapConfig {
    pub fn camera_duration(&self) -> Duration {
        Duration::from_millis(self.camera_duration_ms)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Debug build (test ads, verbose logs)
    #[serde(default)]
    pub debug: bool,
    /// Version shown on the settings screen
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Support channel opened from settings
    #[serde(default = "default_telegram_url")]
    pub telegram_url: String,
    /// `tracing` filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub ads: AdConfig,
    #[serde(default)]
    pub map: MapConfig,
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_telegram_url() -> String {
    "https://t.me/bagimsizdvpn".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            app_version: default_app_version(),
            telegram_url: default_telegram_url(),
            log_level: default_log_level(),
            ads: AdConfig::default(),
            map: MapConfig::default(),
        }
    }
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl AppConfig {
    /// Load from file, format picked by extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        let content = std::fs::read_to_string(path)?;
        Self::from_str_with(&content, format)
    }

    /// Load from string
    pub fn from_str_with(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: Self = match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ads.interstitial_unit_id.is_empty() || self.ads.test_unit_id.is_empty() {
            return Err(ConfigError::MissingAdUnit);
        }
        if self.map.zoom <= 0.0 {
            return Err(ConfigError::InvalidZoom);
        }
        if self.map.camera_duration_ms == 0 {
            return Err(ConfigError::InvalidCameraDuration);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format")]
    UnsupportedFormat,

    #[error("Ad unit id must not be empty")]
    MissingAdUnit,

    #[error("Map zoom must be positive")]
    InvalidZoom,

    #[error("Camera duration must be positive")]
    InvalidCameraDuration,
}
