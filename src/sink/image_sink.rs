//! Image-mode sink: one JPEG file per frame.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;

use crate::camera::CapturedFrame;

use super::{naming, FrameSink, SinkError};

/// Writes every delivered frame as an individual JPEG file named after
/// its capture time.
pub struct ImageSink {
    out_dir: PathBuf,
    serial: String,
    quality: u8,
}

impl ImageSink {
    /// Creates the sink and its output directory.
    pub fn create(out_dir: &Path, serial: &str, quality: u8) -> Result<Self, SinkError> {
        let img_dir = out_dir.join("img");
        fs::create_dir_all(&img_dir).map_err(|source| SinkError::Io {
            path: img_dir,
            source,
        })?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            serial: serial.to_string(),
            quality,
        })
    }
}

impl FrameSink for ImageSink {
    fn write(&mut self, frame: &CapturedFrame, timestamp_ms: i64) -> Result<PathBuf, SinkError> {
        let path = naming::image_path(&self.out_dir, &self.serial, timestamp_ms);
        let file = File::create(&path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        let mut encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
        encoder
            .encode(
                frame.buffer(),
                frame.width(),
                frame.height(),
                image::ColorType::Rgb8,
            )
            .map_err(|e| SinkError::Encode(e.to_string()))?;

        writer.flush().map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
