//! Acquisition configuration.
//!
//! Camera parameters are each either a fixed value or automatic. The
//! automatic case is a real enum variant, not a numeric sentinel, so no
//! consumer can ever observe a placeholder value in place of a resolved
//! parameter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One camera parameter: pinned to a value, or left to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSetting {
    /// The camera's automatic control stays enabled; the value actually
    /// in effect is read back from the device for reporting.
    Auto,
    /// The automatic control is switched off and this value applied.
    Fixed(f64),
}

impl ParamSetting {
    /// Maps an optional override (CLI flag or config key) to a setting;
    /// absent means automatic.
    pub fn from_override(value: Option<f64>) -> Self {
        match value {
            Some(v) => ParamSetting::Fixed(v),
            None => ParamSetting::Auto,
        }
    }

    /// True for the automatic variant.
    pub fn is_auto(&self) -> bool {
        matches!(self, ParamSetting::Auto)
    }
}

/// White-balance channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChannel {
    /// Red channel ratio.
    Red,
    /// Green channel ratio.
    Green,
    /// Blue channel ratio.
    Blue,
}

impl std::fmt::Display for BalanceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BalanceChannel::Red => "red",
            BalanceChannel::Green => "green",
            BalanceChannel::Blue => "blue",
        };
        f.write_str(name)
    }
}

/// Requested camera parameters, applied identically to every camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    /// Exposure time in microseconds.
    pub exposure: ParamSetting,
    /// Gain in camera-specific units.
    pub gain: ParamSetting,
    /// White-balance ratio, red channel.
    pub balance_red: ParamSetting,
    /// White-balance ratio, green channel.
    pub balance_green: ParamSetting,
    /// White-balance ratio, blue channel.
    pub balance_blue: ParamSetting,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            exposure: ParamSetting::Auto,
            gain: ParamSetting::Auto,
            balance_red: ParamSetting::Auto,
            balance_green: ParamSetting::Auto,
            balance_blue: ParamSetting::Auto,
        }
    }
}

/// How captured frames are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One JPEG file per frame.
    Image,
    /// One MJPEG stream per camera per session.
    Video,
}

impl OutputMode {
    /// Short label used in file names and log rows.
    pub fn label(&self) -> &'static str {
        match self {
            OutputMode::Image => "img",
            OutputMode::Video => "vid",
        }
    }
}

/// Full configuration for one acquisition run.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Trigger rate in frames per second.
    pub frame_rate: f64,
    /// Requested camera parameters.
    pub settings: CaptureSettings,
    /// Root directory for image/video and log output.
    pub output_dir: PathBuf,
    /// Image or video persistence.
    pub mode: OutputMode,
    /// JPEG quality, 0-100.
    pub jpeg_quality: u8,
    /// Maximum number of cameras to use.
    pub max_cameras: usize,
    /// Upper bound on the per-cycle trigger-readiness probe.
    pub ready_timeout: Duration,
    /// Wait after a trigger failure before trusting the transport's
    /// removal report (guards against spurious errors).
    pub settle_delay: Duration,
    /// Interval between enumeration polls while waiting for a removed
    /// camera to reappear.
    pub reattach_poll: Duration,
    /// Optional ceiling on the reattachment wait. `None` waits
    /// indefinitely, which suits manually supervised operation.
    pub recovery_ceiling: Option<Duration>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_rate: 25.0,
            settings: CaptureSettings::default(),
            output_dir: PathBuf::from("out"),
            mode: OutputMode::Video,
            jpeg_quality: 95,
            max_cameras: 10,
            ready_timeout: Duration::from_millis(10),
            settle_delay: Duration::from_secs(1),
            reattach_poll: Duration::from_millis(250),
            recovery_ceiling: None,
        }
    }
}

impl AcquisitionConfig {
    /// Returns the trigger period, `1 / frame_rate`.
    ///
    /// Only meaningful after [`Self::validate`] has passed.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        if self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        if self.max_cameras == 0 {
            return Err(ConfigError::NoCamerasAllowed);
        }
        for (name, setting) in [
            ("exposure", self.settings.exposure),
            ("gain", self.settings.gain),
            ("balance-red", self.settings.balance_red),
            ("balance-green", self.settings.balance_green),
            ("balance-blue", self.settings.balance_blue),
        ] {
            if let ParamSetting::Fixed(value) = setting {
                if !value.is_finite() || value <= 0.0 {
                    return Err(ConfigError::InvalidParameter { name, value });
                }
            }
        }
        Ok(())
    }
}

/// Configuration validation and loading errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
    #[error("JPEG quality must be 0-100, got {0}")]
    InvalidQuality(u8),
    #[error("maximum camera count must be at least 1")]
    NoCamerasAllowed,
    #[error("{name} must be a positive number, got {value}")]
    InvalidParameter {
        /// Parameter name as written in config/CLI.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    #[error("failed to read config file: {0}")]
    FileRead(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

/// `[capture]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    /// Trigger rate in frames per second.
    pub frame_rate: f64,
    /// Fixed exposure in microseconds; absent means automatic.
    pub exposure_us: Option<f64>,
    /// Fixed gain; absent means automatic.
    pub gain: Option<f64>,
    /// Fixed white-balance ratio, red channel; absent means automatic.
    pub balance_red: Option<f64>,
    /// Fixed white-balance ratio, green channel; absent means automatic.
    pub balance_green: Option<f64>,
    /// Fixed white-balance ratio, blue channel; absent means automatic.
    pub balance_blue: Option<f64>,
    /// Maximum number of cameras to use.
    pub max_cameras: usize,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            frame_rate: 25.0,
            exposure_us: None,
            gain: None,
            balance_red: None,
            balance_green: None,
            balance_blue: None,
            max_cameras: 10,
        }
    }
}

/// `[output]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Root directory for image/video and log output.
    pub directory: PathBuf,
    /// Save individual images instead of a video stream.
    pub image: bool,
    /// JPEG quality, 0-100.
    pub quality: u8,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("out"),
            image: false,
            quality: 95,
        }
    }
}

/// `[recovery]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// Trigger-readiness probe bound in milliseconds.
    pub ready_timeout_ms: u64,
    /// Settle delay after a trigger failure in milliseconds.
    pub settle_delay_ms: u64,
    /// Enumeration poll interval during reattachment in milliseconds.
    pub reattach_poll_ms: u64,
    /// Reattachment ceiling in milliseconds; absent waits indefinitely.
    pub max_wait_ms: Option<u64>,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 10,
            settle_delay_ms: 1000,
            reattach_poll_ms: 250,
            max_wait_ms: None,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[capture]` section.
    #[serde(default)]
    pub capture: CaptureSection,
    /// `[output]` section.
    #[serde(default)]
    pub output: OutputSection,
    /// `[recovery]` section.
    #[serde(default)]
    pub recovery: RecoverySection,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Converts the file representation into a validated-ready
    /// [`AcquisitionConfig`].
    pub fn into_config(self) -> AcquisitionConfig {
        AcquisitionConfig {
            frame_rate: self.capture.frame_rate,
            settings: CaptureSettings {
                exposure: ParamSetting::from_override(self.capture.exposure_us),
                gain: ParamSetting::from_override(self.capture.gain),
                balance_red: ParamSetting::from_override(self.capture.balance_red),
                balance_green: ParamSetting::from_override(self.capture.balance_green),
                balance_blue: ParamSetting::from_override(self.capture.balance_blue),
            },
            output_dir: self.output.directory,
            mode: if self.output.image {
                OutputMode::Image
            } else {
                OutputMode::Video
            },
            jpeg_quality: self.output.quality,
            max_cameras: self.capture.max_cameras,
            ready_timeout: Duration::from_millis(self.recovery.ready_timeout_ms),
            settle_delay: Duration::from_millis(self.recovery.settle_delay_ms),
            reattach_poll: Duration::from_millis(self.recovery.reattach_poll_ms),
            recovery_ceiling: self.recovery.max_wait_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(AcquisitionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_frame_rate_invalid() {
        let config = AcquisitionConfig {
            frame_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn test_negative_fixed_parameter_invalid() {
        let mut config = AcquisitionConfig::default();
        config.settings.gain = ParamSetting::Fixed(-1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { name: "gain", .. })
        ));
    }

    #[test]
    fn test_period_from_frame_rate() {
        let config = AcquisitionConfig {
            frame_rate: 10.0,
            ..Default::default()
        };
        assert_eq!(config.period(), Duration::from_millis(100));
    }

    #[test]
    fn test_override_mapping() {
        assert_eq!(ParamSetting::from_override(None), ParamSetting::Auto);
        assert_eq!(
            ParamSetting::from_override(Some(5000.0)),
            ParamSetting::Fixed(5000.0)
        );
    }

    #[test]
    fn test_file_config_round_trip() {
        let toml_text = r#"
            [capture]
            frame_rate = 10.0
            exposure_us = 5000.0

            [output]
            image = true
            quality = 80

            [recovery]
            max_wait_ms = 30000
        "#;
        let file: FileConfig = toml::from_str(toml_text).unwrap();
        let config = file.into_config();

        assert_eq!(config.frame_rate, 10.0);
        assert_eq!(config.settings.exposure, ParamSetting::Fixed(5000.0));
        assert!(config.settings.gain.is_auto());
        assert_eq!(config.mode, OutputMode::Image);
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.recovery_ceiling, Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_config_is_defaults() {
        let file: FileConfig = toml::from_str("").unwrap();
        let config = file.into_config();
        assert_eq!(config.frame_rate, 25.0);
        assert_eq!(config.mode, OutputMode::Video);
        assert!(config.recovery_ceiling.is_none());
    }
}
