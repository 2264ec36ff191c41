//! Stable camera identity.
//!
//! Transport-layer device indices are reassigned whenever the bus is
//! re-enumerated, so they cannot be used to recognize a camera across a
//! disconnect/reconnect cycle. The device class plus serial number pair
//! is the only key that survives a replug.

use std::fmt;

/// Identifies one physical camera across attach/detach cycles.
///
/// Immutable once the camera is first discovered. Two `CameraIdentity`
/// values compare equal exactly when they refer to the same physical
/// device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraIdentity {
    device_class: String,
    serial: String,
}

impl CameraIdentity {
    /// Creates an identity from a transport device class and serial number.
    pub fn new(device_class: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            device_class: device_class.into(),
            serial: serial.into(),
        }
    }

    /// Returns the transport device class (e.g. a USB or GigE class name).
    pub fn device_class(&self) -> &str {
        &self.device_class
    }

    /// Returns the camera serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl fmt::Display for CameraIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_class, self.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_is_class_and_serial() {
        let a = CameraIdentity::new("EmuUsb", "40000001");
        let b = CameraIdentity::new("EmuUsb", "40000001");
        let c = CameraIdentity::new("EmuUsb", "40000002");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_identity_display() {
        let id = CameraIdentity::new("EmuUsb", "40000001");
        assert_eq!(id.to_string(), "EmuUsb/40000001");
    }
}
