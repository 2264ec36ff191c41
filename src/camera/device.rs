//! Camera device abstraction.
//!
//! `CameraDevice` is the narrow surface the acquisition core needs from a
//! vendor stack: parameter application with read-back, software-trigger
//! configuration, chunk metadata enablement, the timestamp latch command,
//! and trigger execution. Real vendor SDKs implement this behind their own
//! crate; the emulated backend in [`super::mock`] implements it for tests
//! and demonstration.

use std::time::Duration;

use thiserror::Error;

use crate::config::{BalanceChannel, ParamSetting};

use super::CameraIdentity;

/// Errors raised by a camera device or transport.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device is physically absent. Recoverable: the owning session
    /// reattaches the same identity when it reappears.
    #[error("camera device removed")]
    Removed,
    /// The device lacks a capability the acquisition loop requires.
    #[error("unsupported camera feature: {0}")]
    Unsupported(String),
    /// Any other vendor-stack failure. Fatal when raised during triggering.
    #[error("camera error: {0}")]
    Vendor(String),
    /// No live handle is bound for the requested operation.
    #[error("device not attached")]
    NotAttached,
    /// The reattachment wait exceeded the configured ceiling.
    #[error("device did not reappear within {0:?}")]
    ReattachTimeout(Duration),
    /// A shutdown request arrived while waiting for the device.
    #[error("interrupted while waiting for device")]
    Interrupted,
}

impl DeviceError {
    /// True for conditions that mean the camera was physically unplugged.
    ///
    /// Removal-class errors pause only the affected session; every other
    /// class is fatal for the acquisition loop.
    pub fn is_removal(&self) -> bool {
        matches!(self, DeviceError::Removed)
    }
}

/// One attached camera.
///
/// Implementations deliver captured frames asynchronously through the
/// channel sender handed to [`super::CameraTransport::attach`]; none of
/// these methods return image data directly.
pub trait CameraDevice: Send {
    /// Returns the stable identity of this device.
    fn identity(&self) -> &CameraIdentity;

    /// Returns the vendor model name, for operator-facing logs.
    fn model_name(&self) -> &str;

    /// Returns the full sensor resolution as (width, height).
    fn sensor_size(&self) -> (u32, u32);

    /// Applies an exposure setting and returns the value actually in
    /// effect (read back from the device when the setting is automatic).
    fn set_exposure(&mut self, setting: ParamSetting) -> Result<f64, DeviceError>;

    /// Applies a gain setting and returns the value actually in effect.
    fn set_gain(&mut self, setting: ParamSetting) -> Result<f64, DeviceError>;

    /// Applies a white-balance setting for one channel and returns the
    /// value actually in effect for that channel.
    fn set_balance(
        &mut self,
        channel: BalanceChannel,
        setting: ParamSetting,
    ) -> Result<f64, DeviceError>;

    /// Enables per-frame delivery of capture-time metadata (timestamp,
    /// exposure, gain) alongside the image payload.
    ///
    /// Cameras without this capability cannot be timestamped; the error is
    /// fatal for the device.
    fn enable_chunk_metadata(&mut self) -> Result<(), DeviceError>;

    /// Switches the device into software-triggered acquisition mode.
    fn configure_software_trigger(&mut self) -> Result<(), DeviceError>;

    /// Executes the synchronous latch-then-read timestamp command and
    /// returns the device's monotonic counter value in nanoseconds.
    fn latch_timestamp(&mut self) -> Result<u64, DeviceError>;

    /// Starts acquisition; the device will accept triggers afterwards.
    fn start_acquisition(&mut self) -> Result<(), DeviceError>;

    /// Stops acquisition. Infallible; used on every teardown path.
    fn stop_acquisition(&mut self);

    /// Probes whether the device can accept a trigger, waiting at most
    /// `timeout`. `Ok(false)` means skip this cycle, not an error.
    fn is_trigger_ready(&mut self, timeout: Duration) -> Result<bool, DeviceError>;

    /// Issues a single software trigger. The resulting frame arrives
    /// later on the delivery channel.
    fn execute_trigger(&mut self) -> Result<(), DeviceError>;

    /// True when the transport reports the device as physically absent.
    fn is_removed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_classification() {
        assert!(DeviceError::Removed.is_removal());
        assert!(!DeviceError::Vendor("buffer underrun".into()).is_removal());
        assert!(!DeviceError::Unsupported("chunk mode".into()).is_removal());
        assert!(!DeviceError::NotAttached.is_removal());
    }
}
