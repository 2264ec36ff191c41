//! Command-line interface.
//!
//! Numeric overrides follow the tool's long-standing semantics: an
//! out-of-range value is reported and replaced by the automatic/default
//! behavior rather than aborting the run.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{AcquisitionConfig, ConfigError, FileConfig, OutputMode, ParamSetting};

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "framegrab",
    version,
    about = "Synchronized multi-camera frame acquisition",
    allow_negative_numbers = true
)]
pub struct Args {
    /// Fixed white-balance ratio for the red channel (default: auto).
    #[arg(short = 'R', long = "bwr", value_name = "RATIO")]
    pub balance_red: Option<f64>,

    /// Fixed white-balance ratio for the green channel (default: auto).
    #[arg(short = 'G', long = "bwg", value_name = "RATIO")]
    pub balance_green: Option<f64>,

    /// Fixed white-balance ratio for the blue channel (default: auto).
    #[arg(short = 'B', long = "bwb", value_name = "RATIO")]
    pub balance_blue: Option<f64>,

    /// Fixed exposure time in microseconds (default: auto).
    #[arg(short = 'e', long = "exposure", value_name = "MICROS")]
    pub exposure: Option<f64>,

    /// Recording frame rate in frames per second (default: 25).
    #[arg(short = 'f', long = "framerate", value_name = "FPS")]
    pub frame_rate: Option<f64>,

    /// Fixed gain in camera units (default: auto).
    #[arg(short = 'g', long = "gain", value_name = "GAIN")]
    pub gain: Option<f64>,

    /// Save individual images instead of a video stream.
    #[arg(short = 'i', long = "image")]
    pub image: bool,

    /// Output directory for video/image and log files (default: out).
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// JPEG quality between 0 and 100 (default: 95).
    #[arg(short = 'q', long = "quality", value_name = "QUALITY")]
    pub quality: Option<i64>,

    /// Print camera state and per-frame information.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// TOML configuration file; command-line flags override its values.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of cameras to use (default: 10).
    #[arg(long = "max-cameras", value_name = "N")]
    pub max_cameras: Option<usize>,

    /// Number of emulated cameras presented by the demo transport.
    #[arg(long = "simulate", default_value_t = 2, value_name = "N")]
    pub simulate: usize,
}

impl Args {
    /// Builds the acquisition configuration: config file first (when
    /// given), then command-line overrides on top.
    pub fn into_config(self) -> Result<AcquisitionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => FileConfig::from_file(path)?.into_config(),
            None => AcquisitionConfig::default(),
        };

        if let Some(rate) = self.frame_rate {
            if rate.is_finite() && rate > 0.0 {
                config.frame_rate = rate;
            } else {
                tracing::error!(
                    value = rate,
                    "frame rate has to be greater than 0, using {}",
                    config.frame_rate
                );
            }
        }

        config.settings.exposure =
            positive_override("exposure time", self.exposure, config.settings.exposure);
        config.settings.gain = positive_override("gain", self.gain, config.settings.gain);
        config.settings.balance_red = positive_override(
            "balance white (red channel)",
            self.balance_red,
            config.settings.balance_red,
        );
        config.settings.balance_green = positive_override(
            "balance white (green channel)",
            self.balance_green,
            config.settings.balance_green,
        );
        config.settings.balance_blue = positive_override(
            "balance white (blue channel)",
            self.balance_blue,
            config.settings.balance_blue,
        );

        if self.image {
            config.mode = OutputMode::Image;
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if let Some(quality) = self.quality {
            if (0..=100).contains(&quality) {
                config.jpeg_quality = quality as u8;
            } else {
                tracing::error!(
                    value = quality,
                    "image quality has to be between 0 and 100, using {}",
                    config.jpeg_quality
                );
            }
        }
        if let Some(max) = self.max_cameras {
            config.max_cameras = max;
        }

        Ok(config)
    }
}

/// Applies a CLI override for a fixed-or-auto parameter. Non-positive
/// values fall back to automatic with an error report.
fn positive_override(name: &str, value: Option<f64>, current: ParamSetting) -> ParamSetting {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => ParamSetting::Fixed(v),
        Some(v) => {
            tracing::error!(value = v, "{name} has to be greater than 0, set automatically");
            ParamSetting::Auto
        }
        None => current,
    }
}
