//! Camera transport abstraction.

use crossbeam_channel::Sender;

use super::{CameraDevice, CameraIdentity, CapturedFrame, DeviceError};

/// Device enumeration and attachment for one camera transport stack.
///
/// Constructing a transport performs whatever process-scoped SDK
/// initialization the vendor requires; dropping it tears that state down.
/// The transport outlives every device attached through it.
pub trait CameraTransport: Send + Sync {
    /// Lists the identities of all cameras currently present.
    fn enumerate(&self) -> Result<Vec<CameraIdentity>, DeviceError>;

    /// Attaches the camera with the given identity and returns a live
    /// handle. Frames captured by the device are delivered through
    /// `frames`, on the transport's own delivery context.
    fn attach(
        &self,
        identity: &CameraIdentity,
        frames: Sender<CapturedFrame>,
    ) -> Result<Box<dyn CameraDevice>, DeviceError>;
}
