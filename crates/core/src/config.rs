//! Viewer configuration
//!
//! Every tunable of the preview pipeline in one place: render concurrency,
//! fit-to-width scale bounds, scroll throttle and the scroll-sync attach
//! retry. Configuration can be loaded from a TOML file, environment
//! variables, or created programmatically.

use crate::sync::SyncOptions;
use pdf_compare_render::{ScaleBounds, DEFAULT_MAX_SCALE, DEFAULT_MIN_AVAILABLE_WIDTH, DEFAULT_MIN_SCALE};
use pdf_compare_scheduler::{
    PoolConfig, RetryPolicy, DEFAULT_RENDER_CONCURRENCY, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default interval of the scroll event throttle.
pub const DEFAULT_SCROLL_THROTTLE: Duration = Duration::from_millis(50);

/// Default number of ancestors searched for a pane's scroll owner.
pub const DEFAULT_SCROLL_SEARCH_DEPTH: usize = 5;

const ENV_RENDER_CONCURRENCY: &str = "PDF_COMPARE_RENDER_CONCURRENCY";
const ENV_MIN_SCALE: &str = "PDF_COMPARE_MIN_SCALE";
const ENV_MAX_SCALE: &str = "PDF_COMPARE_MAX_SCALE";
const ENV_MIN_AVAILABLE_WIDTH: &str = "PDF_COMPARE_MIN_AVAILABLE_WIDTH";
const ENV_SCROLL_THROTTLE_MS: &str = "PDF_COMPARE_SCROLL_THROTTLE_MS";
const ENV_ATTACH_RETRY_INTERVAL_MS: &str = "PDF_COMPARE_ATTACH_RETRY_INTERVAL_MS";
const ENV_ATTACH_RETRY_ATTEMPTS: &str = "PDF_COMPARE_ATTACH_RETRY_ATTEMPTS";
const ENV_SCROLL_SEARCH_DEPTH: &str = "PDF_COMPARE_SCROLL_SEARCH_DEPTH";

/// Configuration for viewers and the scroll synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Number of pages rendered concurrently per session
    pub render_concurrency: usize,
    /// Smallest fit-to-width scale
    pub min_scale: f32,
    /// Largest fit-to-width scale
    pub max_scale: f32,
    /// Container width assumed when the real one is smaller, in CSS pixels
    pub min_available_width: f32,
    /// Minimum spacing between mirrored scroll writes
    pub scroll_throttle: Duration,
    /// Spacing between scroll-sync attach retries
    pub attach_retry_interval: Duration,
    /// Retries after the first attach attempt before giving up
    pub attach_retry_attempts: u32,
    /// Ancestors searched for a pane's scroll owner
    pub scroll_owner_search_depth: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            min_available_width: DEFAULT_MIN_AVAILABLE_WIDTH,
            scroll_throttle: DEFAULT_SCROLL_THROTTLE,
            attach_retry_interval: DEFAULT_RETRY_INTERVAL,
            attach_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            scroll_owner_search_depth: DEFAULT_SCROLL_SEARCH_DEPTH,
        }
    }
}

/// On-disk form. Every key is optional; missing keys keep their defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    render_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_available_width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scroll_throttle_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attach_retry_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attach_retry_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scroll_owner_search_depth: Option<usize>,
}

impl ViewerConfig {
    /// Set the number of concurrent page renders.
    pub fn with_render_concurrency(mut self, concurrency: usize) -> Self {
        self.render_concurrency = concurrency;
        self
    }

    /// Set the render scale clamp range.
    pub fn with_scale_range(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Set the minimum assumed container width in pixels.
    pub fn with_min_available_width(mut self, width: f32) -> Self {
        self.min_available_width = width;
        self
    }

    /// Set the scroll handler throttle interval.
    pub fn with_scroll_throttle(mut self, interval: Duration) -> Self {
        self.scroll_throttle = interval;
        self
    }

    /// Sets the attach retry spacing and ceiling.
    pub fn with_attach_retry(mut self, interval: Duration, attempts: u32) -> Self {
        self.attach_retry_interval = interval;
        self.attach_retry_attempts = attempts;
        self
    }

    /// Set how many ancestors are searched for a scroll owner.
    pub fn with_scroll_owner_search_depth(mut self, depth: usize) -> Self {
        self.scroll_owner_search_depth = depth;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_COMPARE_RENDER_CONCURRENCY` (default: 2)
    /// - `PDF_COMPARE_MIN_SCALE` / `PDF_COMPARE_MAX_SCALE` (default: 0.6 / 1.6)
    /// - `PDF_COMPARE_MIN_AVAILABLE_WIDTH` (default: 200)
    /// - `PDF_COMPARE_SCROLL_THROTTLE_MS` (default: 50)
    /// - `PDF_COMPARE_ATTACH_RETRY_INTERVAL_MS` (default: 200)
    /// - `PDF_COMPARE_ATTACH_RETRY_ATTEMPTS` (default: 30)
    /// - `PDF_COMPARE_SCROLL_SEARCH_DEPTH` (default: 5)
    ///
    /// # Errors
    /// Returns an error if any variable holds an unparsable value, or if the
    /// resulting configuration fails [`ViewerConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = ConfigFile {
            render_concurrency: env_value(ENV_RENDER_CONCURRENCY)?,
            min_scale: env_value(ENV_MIN_SCALE)?,
            max_scale: env_value(ENV_MAX_SCALE)?,
            min_available_width: env_value(ENV_MIN_AVAILABLE_WIDTH)?,
            scroll_throttle_ms: env_value(ENV_SCROLL_THROTTLE_MS)?,
            attach_retry_interval_ms: env_value(ENV_ATTACH_RETRY_INTERVAL_MS)?,
            attach_retry_attempts: env_value(ENV_ATTACH_RETRY_ATTEMPTS)?,
            scroll_owner_search_depth: env_value(ENV_SCROLL_SEARCH_DEPTH)?,
        };
        let config = Self::default().merged(file);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// render_concurrency = 2
    /// min_scale = 0.6
    /// max_scale = 1.6
    /// min_available_width = 200.0
    /// scroll_throttle_ms = 50
    /// attach_retry_interval_ms = 200
    /// attach_retry_attempts = 30
    /// scroll_owner_search_depth = 5
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string. Unknown keys are ignored.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        let config = Self::default().merged(file);
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            render_concurrency: Some(self.render_concurrency),
            min_scale: Some(self.min_scale),
            max_scale: Some(self.max_scale),
            min_available_width: Some(self.min_available_width),
            scroll_throttle_ms: Some(duration_ms(self.scroll_throttle)),
            attach_retry_interval_ms: Some(duration_ms(self.attach_retry_interval)),
            attach_retry_attempts: Some(self.attach_retry_attempts),
            scroll_owner_search_depth: Some(self.scroll_owner_search_depth),
        };
        let body = toml::to_string(&file).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(format!("# PDF Compare Viewer Configuration\n{}", body))
    }

    fn merged(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.render_concurrency {
            self.render_concurrency = v;
        }
        if let Some(v) = file.min_scale {
            self.min_scale = v;
        }
        if let Some(v) = file.max_scale {
            self.max_scale = v;
        }
        if let Some(v) = file.min_available_width {
            self.min_available_width = v;
        }
        if let Some(ms) = file.scroll_throttle_ms {
            self.scroll_throttle = Duration::from_millis(ms);
        }
        if let Some(ms) = file.attach_retry_interval_ms {
            self.attach_retry_interval = Duration::from_millis(ms);
        }
        if let Some(v) = file.attach_retry_attempts {
            self.attach_retry_attempts = v;
        }
        if let Some(v) = file.scroll_owner_search_depth {
            self.scroll_owner_search_depth = v;
        }
        self
    }

    /// Checks that the values describe a usable pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_concurrency == 0 {
            return Err(ConfigError::InvalidValue("render_concurrency".to_string()));
        }
        if self.attach_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue("attach_retry_attempts".to_string()));
        }
        if !(self.min_scale > 0.0 && self.min_scale.is_finite()) {
            return Err(ConfigError::InvalidValue("min_scale".to_string()));
        }
        if !(self.max_scale >= self.min_scale && self.max_scale.is_finite()) {
            return Err(ConfigError::InvalidValue("max_scale".to_string()));
        }
        if !(self.min_available_width >= 0.0 && self.min_available_width.is_finite()) {
            return Err(ConfigError::InvalidValue("min_available_width".to_string()));
        }
        Ok(())
    }

    /// Render pool settings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.render_concurrency)
    }

    /// Render scale bounds.
    pub fn scale_bounds(&self) -> ScaleBounds {
        ScaleBounds {
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            min_available_width: self.min_available_width,
        }
    }

    /// Scroll sync attach retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attach_retry_interval, self.attach_retry_attempts)
    }

    /// Scroll synchronizer options.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            throttle: self.scroll_throttle,
            retry: self.retry_policy(),
            search_depth: self.scroll_owner_search_depth,
        }
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
}
