//! Per-camera session management.
//!
//! A [`DeviceSession`] carries one physical camera through configuration,
//! arming, triggering, removal, and reattachment, while its delivery
//! worker persists frames on a separate thread. The session's frame
//! index and output files outlive any number of cable pulls.

mod delivery;
mod session;

pub use session::{DeviceSession, ResolvedParams, SessionError, SessionState};
