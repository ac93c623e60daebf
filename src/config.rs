//! Configuration management for `weatherwise`
//!
//! Handles loading configuration from a TOML file and environment variables,
//! and provides validation for all configuration settings.

use crate::WeatherwiseError;
use crate::error::Result;
use crate::weather::RetryPolicy;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherwiseConfig {
    /// Weather and geocoding service endpoints
    pub weather: WeatherConfig,
    /// Public IP geolocation services
    pub ip_lookup: IpLookupConfig,
    /// Retry policy for the external forecast fetch
    pub retry: RetryPolicy,
    /// In-memory cache capacities
    pub cache: CacheConfig,
    /// Data sources and defaults
    pub data: DataConfig,
    /// Model hyperparameters
    pub model: ModelConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Weather service configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Forecast endpoint base URL (also serves the recent-days window)
    pub forecast_base_url: String,
    /// Archive endpoint base URL
    pub archive_base_url: String,
    /// Geocoding endpoint base URL
    pub geocoding_base_url: String,
    /// Timezone used for daily aggregation
    pub timezone: String,
    /// Timeout for historical data requests
    pub data_timeout_seconds: u64,
    /// Timeout for the external forecast request
    pub forecast_timeout_seconds: u64,
    /// Timeout for geocoding lookups
    pub geocoding_timeout_seconds: u64,
}

/// IP geolocation providers, queried in field order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpLookupConfig {
    /// ipapi.co JSON endpoint
    pub ipapi_url: String,
    /// ipwho.is endpoint
    pub ipwhois_url: String,
    /// ip-api.com JSON endpoint including its field selection
    pub ip_api_url: String,
    /// Timeout for each provider
    pub timeout_seconds: u64,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resolved coordinates kept
    pub coordinate_capacity: u64,
    /// Maximum number of per-city historical series kept
    pub series_capacity: u64,
}

/// Data source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Local tabular fallback file
    pub csv_path: Option<PathBuf>,
    /// City used when a name cannot be resolved
    pub default_city: String,
    /// Fixed seed for the synthetic tier; random when unset
    pub synthetic_seed: Option<u64>,
}

/// Model hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Enable the secondary sequence model
    pub sequence_model: bool,
    /// Window length of the sequence model
    pub lookback: usize,
    /// Training epochs of the sequence model
    pub sequence_epochs: usize,
    /// Trees in the risk forest
    pub forest_trees: usize,
    /// Maximum depth of each tree
    pub forest_max_depth: usize,
    /// Seed for bootstrap sampling and feature selection
    pub forest_seed: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (pretty or json)
    pub format: String,
}

// Default value functions
fn default_forecast_base_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_archive_base_url() -> String {
    "https://archive-api.open-meteo.com/v1".to_string()
}

fn default_geocoding_base_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

const fn default_data_timeout() -> u64 {
    30
}

const fn default_forecast_timeout() -> u64 {
    20
}

const fn default_geocoding_timeout() -> u64 {
    15
}

fn default_ipapi_url() -> String {
    "https://ipapi.co/json/".to_string()
}

fn default_ipwhois_url() -> String {
    "https://ipwho.is/".to_string()
}

fn default_ip_api_url() -> String {
    "http://ip-api.com/json/?fields=status,city,lat,lon&lang=zh-CN".to_string()
}

const fn default_ip_timeout() -> u64 {
    6
}

const fn default_coordinate_capacity() -> u64 {
    256
}

const fn default_series_capacity() -> u64 {
    12
}

fn default_csv_path() -> Option<PathBuf> {
    Some(PathBuf::from("weather_prediction_dataset.csv"))
}

fn default_city() -> String {
    "北京".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_base_url: default_forecast_base_url(),
            archive_base_url: default_archive_base_url(),
            geocoding_base_url: default_geocoding_base_url(),
            timezone: default_timezone(),
            data_timeout_seconds: default_data_timeout(),
            forecast_timeout_seconds: default_forecast_timeout(),
            geocoding_timeout_seconds: default_geocoding_timeout(),
        }
    }
}

impl Default for IpLookupConfig {
    fn default() -> Self {
        Self {
            ipapi_url: default_ipapi_url(),
            ipwhois_url: default_ipwhois_url(),
            ip_api_url: default_ip_api_url(),
            timeout_seconds: default_ip_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            coordinate_capacity: default_coordinate_capacity(),
            series_capacity: default_series_capacity(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            default_city: default_city(),
            synthetic_seed: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sequence_model: true,
            lookback: 14,
            sequence_epochs: 60,
            forest_trees: 120,
            forest_max_depth: 6,
            forest_seed: 42,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WeatherwiseConfig {
    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        // WEATHERWISE_WEATHER__TIMEZONE=Europe/Berlin
        builder = builder.add_source(
            Environment::with_prefix("WEATHERWISE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| WeatherwiseError::config(format!("Failed to build configuration: {e}")))?;

        let mut config: WeatherwiseConfig = settings.try_deserialize().map_err(|e| {
            WeatherwiseError::config(format!("Failed to deserialize configuration: {e}"))
        })?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Default configuration file path
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("weatherwise.toml")
    }

    /// Apply default values to zeroed or empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.weather.forecast_base_url.is_empty() {
            self.weather.forecast_base_url = default_forecast_base_url();
        }
        if self.weather.archive_base_url.is_empty() {
            self.weather.archive_base_url = default_archive_base_url();
        }
        if self.weather.geocoding_base_url.is_empty() {
            self.weather.geocoding_base_url = default_geocoding_base_url();
        }
        if self.weather.timezone.is_empty() {
            self.weather.timezone = default_timezone();
        }
        if self.weather.data_timeout_seconds == 0 {
            self.weather.data_timeout_seconds = default_data_timeout();
        }
        if self.weather.forecast_timeout_seconds == 0 {
            self.weather.forecast_timeout_seconds = default_forecast_timeout();
        }
        if self.weather.geocoding_timeout_seconds == 0 {
            self.weather.geocoding_timeout_seconds = default_geocoding_timeout();
        }
        if self.ip_lookup.ipapi_url.is_empty() {
            self.ip_lookup.ipapi_url = default_ipapi_url();
        }
        if self.ip_lookup.ipwhois_url.is_empty() {
            self.ip_lookup.ipwhois_url = default_ipwhois_url();
        }
        if self.ip_lookup.ip_api_url.is_empty() {
            self.ip_lookup.ip_api_url = default_ip_api_url();
        }
        if self.ip_lookup.timeout_seconds == 0 {
            self.ip_lookup.timeout_seconds = default_ip_timeout();
        }
        if self.cache.coordinate_capacity == 0 {
            self.cache.coordinate_capacity = default_coordinate_capacity();
        }
        if self.cache.series_capacity == 0 {
            self.cache.series_capacity = default_series_capacity();
        }
        if self.data.default_city.trim().is_empty() {
            self.data.default_city = default_city();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        let timeouts = [
            self.weather.data_timeout_seconds,
            self.weather.forecast_timeout_seconds,
            self.weather.geocoding_timeout_seconds,
            self.ip_lookup.timeout_seconds,
        ];
        if timeouts.iter().any(|t| *t > 300) {
            return Err(WeatherwiseError::config(
                "Request timeouts cannot exceed 300 seconds",
            ));
        }

        if self.retry.max_retries > 10 {
            return Err(WeatherwiseError::config("Max retries cannot exceed 10"));
        }

        if self.retry.multiplier < 1.0 {
            return Err(WeatherwiseError::config(
                "Retry multiplier must be at least 1.0",
            ));
        }

        if self.model.lookback < 2 || self.model.lookback > 60 {
            return Err(WeatherwiseError::config(
                "Sequence lookback must be between 2 and 60 days",
            ));
        }

        if self.model.forest_trees == 0 || self.model.forest_max_depth == 0 {
            return Err(WeatherwiseError::config(
                "Forest needs at least one tree of depth one",
            ));
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(WeatherwiseError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(WeatherwiseError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            )));
        }

        for url in [
            &self.weather.forecast_base_url,
            &self.weather.archive_base_url,
            &self.weather.geocoding_base_url,
            &self.ip_lookup.ipapi_url,
            &self.ip_lookup.ipwhois_url,
            &self.ip_lookup.ip_api_url,
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(WeatherwiseError::config(format!(
                    "Base URL '{url}' must be a valid HTTP or HTTPS URL"
                )));
            }
        }

        Ok(())
    }
}
