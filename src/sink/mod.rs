//! Frame persistence.
//!
//! A [`FrameSink`] accepts timestamped frames and writes them to disk,
//! either as one JPEG file per frame ([`ImageSink`]) or as one MJPEG
//! stream per camera per session ([`VideoSink`]). The per-frame CSV log
//! lives alongside in [`FrameLog`]. All output paths derive
//! deterministically from the camera serial number and the session start
//! time, so concurrent cameras and consecutive sessions never collide.

mod frame_log;
mod image_sink;
pub mod naming;
mod video_sink;

use std::path::PathBuf;

use thiserror::Error;

use crate::camera::CapturedFrame;

pub use frame_log::{FrameLog, LogRecord};
pub use image_sink::ImageSink;
pub use video_sink::VideoSink;

/// Errors raised while persisting frames or log rows.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem failure on an output path.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// JPEG encoding failure.
    #[error("failed to encode frame: {0}")]
    Encode(String),
    /// CSV log failure.
    #[error("failed to write log row: {0}")]
    Log(#[from] csv::Error),
}

/// Destination for delivered frames.
///
/// One sink instance belongs to exactly one device session and is only
/// touched from that session's delivery context.
pub trait FrameSink: Send {
    /// Persists one frame stamped with the given wall-clock time and
    /// returns the path recorded in the frame log (the per-frame file in
    /// image mode, the stream file in video mode).
    fn write(&mut self, frame: &CapturedFrame, timestamp_ms: i64) -> Result<PathBuf, SinkError>;

    /// Flushes and releases the sink. Called once when the owning
    /// session shuts down.
    fn finalize(&mut self) -> Result<(), SinkError>;
}
