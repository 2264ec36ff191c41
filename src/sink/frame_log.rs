//! Per-camera CSV frame log.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{naming, SinkError};

/// One row of the frame log.
///
/// Field order defines the CSV column order. Exposure and gain are the
/// capture-time chunk values; the white-balance columns are the values
/// resolved at configure time (the camera does not report them per
/// frame).
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Running frame index for this camera, contiguous across
    /// reattachments.
    pub index: u64,
    /// Output mode label, `img` or `vid`.
    pub mode: &'static str,
    /// Camera serial number.
    pub camera: String,
    /// Path the frame was written to.
    pub file_path: String,
    /// Wall-clock capture time in milliseconds.
    pub timestamp_in_ms: i64,
    /// Human-readable capture time.
    pub iso_datetime: String,
    /// Exposure time at capture, microseconds.
    pub exposure_time: f64,
    /// Gain at capture.
    pub gain: f64,
    /// White-balance ratio, red channel.
    pub white_balance_r: f64,
    /// White-balance ratio, green channel.
    pub white_balance_g: f64,
    /// White-balance ratio, blue channel.
    pub white_balance_b: f64,
}

/// Append-only CSV log for one camera's session.
///
/// The file stays open for the whole lifetime of the physical device's
/// session, across reattachments, so rows remain contiguous.
pub struct FrameLog {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl FrameLog {
    /// Creates the log file for a camera session, including its parent
    /// directory. The header row is written with the first record.
    pub fn create(
        out_dir: &Path,
        serial: &str,
        session_start_ms: i64,
    ) -> Result<Self, SinkError> {
        let path = naming::log_path(out_dir, serial, session_start_ms);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let writer = csv::Writer::from_path(&path)?;
        tracing::debug!(path = %path.display(), "frame log opened");
        Ok(Self { writer, path })
    }

    /// Appends one row and flushes it, so the log is complete up to the
    /// last delivered frame even if the process dies.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        self.writer.serialize(record)?;
        self.writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(index: u64) -> LogRecord {
        LogRecord {
            index,
            mode: "img",
            camera: "40000001".to_string(),
            file_path: "out/img/x.jpg".to_string(),
            timestamp_in_ms: 1_600_000_000_123,
            iso_datetime: "2020-09-13T12:26:40.123".to_string(),
            exposure_time: 5000.0,
            gain: 2.5,
            white_balance_r: 1.2,
            white_balance_g: 1.0,
            white_balance_b: 1.6,
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = FrameLog::create(dir.path(), "40000001", 1234).unwrap();
        log.append(&sample_record(0)).unwrap();
        log.append(&sample_record(1)).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "index,mode,camera,file_path,timestamp_in_ms,iso_datetime,\
             exposure_time,gain,white_balance_r,white_balance_g,white_balance_b"
        );
        assert!(lines.next().unwrap().starts_with("0,img,40000001,"));
        assert!(lines.next().unwrap().starts_with("1,img,40000001,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_log_path_under_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = FrameLog::create(dir.path(), "40000001", 99).unwrap();
        assert!(log.path().starts_with(dir.path().join("log")));
        assert!(log.path().exists());
    }
}
