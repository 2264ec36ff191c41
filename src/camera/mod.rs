//! Camera transport seam.
//!
//! Everything the acquisition core needs from a vendor camera stack,
//! expressed as two traits: [`CameraTransport`] (enumeration and
//! attachment) and [`CameraDevice`] (one attached camera). The emulated
//! backend in [`mock`] drives the whole pipeline without hardware.

mod device;
mod frame;
mod identity;
pub mod mock;
mod transport;

pub use device::{CameraDevice, DeviceError};
pub use frame::{CapturedFrame, ChunkMeta};
pub use identity::CameraIdentity;
pub use mock::{MockDeviceControl, MockTransport};
pub use transport::CameraTransport;
