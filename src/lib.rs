//! Synchronized Multi-Camera Frame Acquisition
//!
//! Triggers one or more industrial cameras on a fixed periodic schedule,
//! timestamps each captured frame against host wall-clock time, persists
//! frames as JPEG images or an MJPEG stream plus a per-camera CSV log,
//! and recovers automatically when a camera is physically disconnected
//! and reconnected.
//!
//! # Architecture
//!
//! ```text
//! supervisor ── scheduler ──> session ──> session ──> ...   (trigger cycle)
//!                                │
//!                          delivery worker                  (per camera)
//!                                │
//!                       clock ── sink ── frame log
//! ```
//!
//! One thread drives the trigger cycle across all cameras; each camera's
//! frames are persisted by its own delivery worker, so slow I/O never
//! stalls triggering. Camera hardware sits behind the
//! [`camera::CameraTransport`] / [`camera::CameraDevice`] traits; the
//! emulated backend exercises everything without hardware.
//!
//! # Design Principles
//!
//! - **Drift-free cadence**: trigger deadlines form an arithmetic
//!   sequence from the start instant, whatever each cycle costs.
//! - **One clock offset per attachment**: every frame's wall-clock
//!   timestamp derives from the offset estimated right after the owning
//!   camera was last (re)attached.
//! - **Removal is not an error**: an unplugged camera pauses only its
//!   own session; the others keep their cadence and the log stays
//!   contiguous across the replug.
//!
//! # Example
//!
//! ```no_run
//! use framegrab::{
//!     AcquisitionConfig, CancelToken, CaptureSupervisor, MockTransport,
//! };
//!
//! let transport = MockTransport::with_devices(2);
//! let config = AcquisitionConfig::default();
//!
//! let mut supervisor =
//!     CaptureSupervisor::new(Box::new(transport), config).unwrap();
//! supervisor.start().unwrap();
//!
//! // A signal handler calls `cancel.cancel()` to stop the loop at the
//! // next cycle boundary.
//! let cancel = CancelToken::new();
//! supervisor.run(&cancel).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod camera;
pub mod cli;
pub mod clock;
pub mod config;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod supervisor;

// Re-export commonly used types at crate root
pub use camera::{
    CameraDevice, CameraIdentity, CameraTransport, CapturedFrame, ChunkMeta, MockTransport,
};
pub use config::{AcquisitionConfig, CaptureSettings, OutputMode, ParamSetting};
pub use scheduler::AcquisitionScheduler;
pub use session::{DeviceSession, SessionState};
pub use shutdown::CancelToken;
pub use supervisor::{CaptureError, CaptureSupervisor};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
