//! Deterministic output naming.
//!
//! Every output file is keyed by the camera serial number plus a
//! timestamp: the session start for log and video files, the frame's own
//! wall-clock time for image files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

fn local_datetime(timestamp_ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(timestamp_ms).single()
}

/// Formats a wall-clock millisecond timestamp for file names,
/// e.g. `2021_07_20_13_45_12_345`.
pub fn file_datetime(timestamp_ms: i64) -> String {
    match local_datetime(timestamp_ms) {
        Some(dt) => dt.format("%Y_%m_%d_%H_%M_%S_%3f").to_string(),
        None => format!("invalid_{timestamp_ms}"),
    }
}

/// Formats a wall-clock millisecond timestamp for log rows,
/// e.g. `2021-07-20T13:45:12.345`.
pub fn iso_datetime(timestamp_ms: i64) -> String {
    match local_datetime(timestamp_ms) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        None => format!("invalid({timestamp_ms})"),
    }
}

/// Path of the per-camera CSV log for one session.
pub fn log_path(out_dir: &Path, serial: &str, session_start_ms: i64) -> PathBuf {
    out_dir
        .join("log")
        .join(format!("cam{serial}log{session_start_ms}.csv"))
}

/// Path of one captured image.
pub fn image_path(out_dir: &Path, serial: &str, timestamp_ms: i64) -> PathBuf {
    out_dir
        .join("img")
        .join(format!("cam{serial}img{}.jpg", file_datetime(timestamp_ms)))
}

/// Path of the per-camera MJPEG stream for one session.
pub fn video_path(out_dir: &Path, serial: &str, session_start_ms: i64) -> PathBuf {
    out_dir
        .join("vid")
        .join(format!("cam{serial}vid{}.mjpeg", file_datetime(session_start_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_keyed_by_serial_and_start() {
        let out = Path::new("out");
        let a = log_path(out, "40000001", 1_600_000_000_000);
        let b = log_path(out, "40000002", 1_600_000_000_000);
        let c = log_path(out, "40000001", 1_600_000_000_001);

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, log_path(out, "40000001", 1_600_000_000_000));
    }

    #[test]
    fn test_log_path_shape() {
        let path = log_path(Path::new("out"), "40000001", 1234);
        assert_eq!(path, PathBuf::from("out/log/cam40000001log1234.csv"));
    }

    #[test]
    fn test_file_datetime_shape() {
        // Exact value depends on the host timezone; the shape does not.
        let formatted = file_datetime(1_600_000_000_000);
        assert_eq!(formatted.len(), "2020_09_13_12_26_40_000".len());
        assert_eq!(formatted.matches('_').count(), 6);
    }

    #[test]
    fn test_iso_datetime_shape() {
        let formatted = iso_datetime(1_600_000_000_123);
        assert!(formatted.contains('T'));
        assert!(formatted.ends_with(".123"));
    }
}
