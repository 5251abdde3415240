//! Configuration management for the fall detection service.
//!
//! Configuration is loaded from files (config/default.toml, config/{env}.toml)
//! and environment variables prefixed with FALLWATCH_, with serde defaults
//! covering everything so the service also starts bare.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchConfig {
    /// Capture device configuration
    #[serde(default)]
    pub camera: CameraConfig,

    /// Detection sampling configuration
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Fall confirmation window configuration
    #[serde(default)]
    pub fall: FallConfig,

    /// HTTP stream server configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Alert notification configuration
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Periodic stats monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Capture device configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Capture device path (e.g. "/dev/video0")
    #[serde(default = "default_device")]
    pub device: String,

    /// Requested capture width (best-effort; the device may ignore it)
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,

    /// Requested capture height
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,

    /// Requested capture rate in frames per second
    #[serde(default = "default_capture_fps")]
    pub capture_fps: u32,

    /// Side length of the square working frame every capture is resized to
    #[serde(default = "default_frame_size")]
    pub frame_size: u32,

    /// Maximum wait for a single frame read in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Sleep between retries after a failed read in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Timeout for the capture pipeline to reach the playing state in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Detection sampling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Run the detector on every Nth captured frame; skipped frames are
    /// still published to the live stream
    #[serde(default = "default_sample_stride")]
    pub sample_stride: u64,
}

/// Fall confirmation window configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FallConfig {
    /// A second detection earlier than this after the candidate is noise
    #[serde(default = "default_min_gap_secs")]
    pub min_gap_secs: u64,

    /// A second detection later than this starts a fresh candidate
    #[serde(default = "default_max_gap_secs")]
    pub max_gap_secs: u64,
}

/// HTTP stream server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-viewer output rate cap in frames per second
    #[serde(default = "default_viewer_fps")]
    pub viewer_fps: f64,

    /// JPEG quality for the live stream (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Alert notification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Recipient identifiers, loaded once at startup
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Delay between per-recipient sends in milliseconds
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Periodic stats monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Interval between stats log lines in seconds
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

// Default value functions
fn default_device() -> String {
    "/dev/video0".to_string()
}
fn default_capture_width() -> u32 {
    640
}
fn default_capture_height() -> u32 {
    480
}
fn default_capture_fps() -> u32 {
    30
}
fn default_frame_size() -> u32 {
    320
}
fn default_read_timeout_ms() -> u64 {
    500
}
fn default_retry_delay_ms() -> u64 {
    10
}
fn default_connection_timeout() -> u64 {
    10
}
fn default_sample_stride() -> u64 {
    3
}
fn default_min_gap_secs() -> u64 {
    7
}
fn default_max_gap_secs() -> u64 {
    15
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_viewer_fps() -> f64 {
    15.0
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_send_delay_ms() -> u64 {
    200
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_monitor_interval() -> u64 {
    30
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            capture_fps: default_capture_fps(),
            frame_size: default_frame_size(),
            read_timeout_ms: default_read_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_stride: default_sample_stride(),
        }
    }
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            min_gap_secs: default_min_gap_secs(),
            max_gap_secs: default_max_gap_secs(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            viewer_fps: default_viewer_fps(),
            jpeg_quality: default_jpeg_quality(),
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

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
        }
    }
}

impl WatchConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Later sources override earlier:
    /// 1. Default config file (config/default.toml)
    /// 2. Environment-specific config (config/{RUN_MODE}.toml)
    /// 3. Environment variables (e.g. FALLWATCH_CAMERA__DEVICE)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("FALLWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("FALLWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.camera.device.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "camera.device".to_string(),
            ));
        }

        if self.camera.capture_width == 0 || self.camera.capture_height == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "camera.capture_width/height".to_string(),
                message: "Dimensions must be greater than 0".to_string(),
            });
        }

        if self.camera.frame_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "camera.frame_size".to_string(),
                message: "Working frame size must be greater than 0".to_string(),
            });
        }

        if self.camera.capture_fps == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "camera.capture_fps".to_string(),
                message: "Capture rate must be greater than 0".to_string(),
            });
        }

        if self.detection.sample_stride == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "detection.sample_stride".to_string(),
                message: "Sampling stride must be at least 1".to_string(),
            });
        }

        if self.fall.min_gap_secs == 0 || self.fall.min_gap_secs >= self.fall.max_gap_secs {
            return Err(ConfigValidationError::InvalidValue {
                field: "fall.min_gap_secs/max_gap_secs".to_string(),
                message: "Confirmation window requires 0 < min_gap < max_gap".to_string(),
            });
        }

        if self.stream.viewer_fps <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "stream.viewer_fps".to_string(),
                message: "Viewer rate cap must be greater than 0".to_string(),
            });
        }

        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err(ConfigValidationError::InvalidValue {
                field: "stream.jpeg_quality".to_string(),
                message: "JPEG quality must be in 1..=100".to_string(),
            });
        }

        Ok(())
    }
}

impl CameraConfig {
    /// Sleep between retries after a failed read.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl FallConfig {
    pub fn min_gap(&self) -> Duration {
        Duration::from_secs(self.min_gap_secs)
    }

    pub fn max_gap(&self) -> Duration {
        Duration::from_secs(self.max_gap_secs)
    }
}

impl StreamConfig {
    /// Minimum interval between frames sent to a single viewer.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.viewer_fps)
    }
}

impl NotifyConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.frame_size, 320);
        assert_eq!(config.fall.min_gap_secs, 7);
        assert_eq!(config.fall.max_gap_secs, 15);
        assert_eq!(config.detection.sample_stride, 3);
    }

    #[test]
    fn test_missing_device() {
        let mut config = WatchConfig::default();
        config.camera.device = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut config = WatchConfig::default();
        config.camera.capture_width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let mut config = WatchConfig::default();
        config.detection.sample_stride = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = WatchConfig::default();
        config.fall.min_gap_secs = 20;
        config.fall.max_gap_secs = 15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_viewer_fps_rejected() {
        let mut config = WatchConfig::default();
        config.stream.viewer_fps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jpeg_quality_bounds() {
        let mut config = WatchConfig::default();
        config.stream.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.stream.jpeg_quality = 101;
        assert!(config.validate().is_err());
        config.stream.jpeg_quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = WatchConfig::default();
        assert_eq!(config.fall.min_gap(), Duration::from_secs(7));
        assert_eq!(config.fall.max_gap(), Duration::from_secs(15));
        assert_eq!(config.camera.retry_delay(), Duration::from_millis(10));
        assert!((config.stream.frame_interval().as_secs_f64() - 1.0 / 15.0).abs() < 1e-6);
    }
}
