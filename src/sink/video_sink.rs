//! Video-mode sink: one MJPEG stream per camera per session.
//!
//! The stream is a motion-JPEG elementary stream, i.e. concatenated JPEG
//! frames. The frame rate is metadata carried by the frame log rather
//! than the container, so the file needs no index or header and can be
//! appended to for the whole session.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;

use crate::camera::CapturedFrame;

use super::{naming, FrameSink, SinkError};

/// Appends every delivered frame to a per-session MJPEG stream.
pub struct VideoSink {
    path: PathBuf,
    writer: BufWriter<File>,
    quality: u8,
    frames_written: u64,
}

impl VideoSink {
    /// Opens the stream file for a camera session, including its parent
    /// directory.
    pub fn create(
        out_dir: &Path,
        serial: &str,
        session_start_ms: i64,
        quality: u8,
    ) -> Result<Self, SinkError> {
        let path = naming::video_path(out_dir, serial, session_start_ms);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(&path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "video stream opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            quality,
            frames_written: 0,
        })
    }

    /// Returns the stream file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for VideoSink {
    fn write(&mut self, frame: &CapturedFrame, _timestamp_ms: i64) -> Result<PathBuf, SinkError> {
        let mut encoder = JpegEncoder::new_with_quality(&mut self.writer, self.quality);
        encoder
            .encode(
                frame.buffer(),
                frame.width(),
                frame.height(),
                image::ColorType::Rgb8,
            )
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        self.frames_written += 1;
        Ok(self.path.clone())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(
            path = %self.path.display(),
            frames = self.frames_written,
            "video stream released"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_to_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = VideoSink::create(dir.path(), "40000001", 1234, 95).unwrap();
        let frame = CapturedFrame::new(vec![64u8; 8 * 6 * 3], 8, 6, None);

        let first = sink.write(&frame, 1).unwrap();
        let second = sink.write(&frame, 2).unwrap();
        assert_eq!(first, second);

        sink.finalize().unwrap();
        let len = std::fs::metadata(&first).unwrap().len();
        assert!(len > 0);

        let vid_dir: Vec<_> = std::fs::read_dir(dir.path().join("vid"))
            .unwrap()
            .collect();
        assert_eq!(vid_dir.len(), 1);
    }

    #[test]
    fn test_stream_is_concatenated_jpegs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = VideoSink::create(dir.path(), "40000001", 1234, 95).unwrap();
        let frame = CapturedFrame::new(vec![200u8; 8 * 6 * 3], 8, 6, None);

        sink.write(&frame, 1).unwrap();
        sink.write(&frame, 2).unwrap();
        sink.finalize().unwrap();

        let bytes = std::fs::read(sink.path()).unwrap();
        // Two JPEG start-of-image markers.
        let soi_count = bytes
            .windows(2)
            .filter(|w| w[0] == 0xFF && w[1] == 0xD8)
            .count();
        assert_eq!(soi_count, 2);
    }
}
