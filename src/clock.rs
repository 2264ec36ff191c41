//! Device-clock to wall-clock synchronization.
//!
//! Cameras timestamp frames with an internal monotonic counter that has
//! no relationship to host time. The offset between the two is estimated
//! once per attachment by latching the device counter and reading the
//! host wall clock immediately adjacent to the latch. The offset is then
//! applied to every frame of that attachment; drift within one attachment
//! is assumed negligible for the intended recording durations, so the
//! offset is never refreshed per-frame.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::camera::{CameraDevice, DeviceError};

/// Signed difference between host wall-clock and a device's clock, in
/// nanoseconds. Valid for exactly one attachment of that device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockOffset(i64);

impl ClockOffset {
    /// Wraps a raw nanosecond offset.
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the offset in nanoseconds.
    pub fn as_nanos(self) -> i64 {
        self.0
    }
}

/// Reads the host wall clock as nanoseconds since the Unix epoch.
pub fn host_wall_clock_nanos() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i64,
        // A pre-epoch host clock leaves timestamps degenerate but defined.
        Err(_) => 0,
    }
}

/// Reads the host wall clock as milliseconds since the Unix epoch.
pub fn host_wall_clock_millis() -> i64 {
    host_wall_clock_nanos() / 1_000_000
}

/// Estimates the device-to-host clock offset for one attachment.
///
/// Must be called after every (re)attachment, before the first trigger of
/// that attachment. A failing latch command is fatal for the device;
/// there is no fallback timestamp source.
pub fn estimate_offset(device: &mut dyn CameraDevice) -> Result<ClockOffset, DeviceError> {
    let device_ns = device.latch_timestamp()?;
    let host_ns = host_wall_clock_nanos();
    Ok(ClockOffset::from_nanos(host_ns.wrapping_sub(device_ns as i64)))
}

/// Converts a device timestamp to wall-clock milliseconds using the
/// offset captured at the owning session's last attachment.
///
/// Truncating integer division, matching the millisecond resolution of
/// the frame log.
pub fn wall_clock_millis(device_ns: u64, offset: ClockOffset) -> i64 {
    (device_ns as i64).wrapping_add(offset.as_nanos()) / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraIdentity, CameraTransport, MockTransport};
    use crossbeam_channel::unbounded;
    use proptest::prelude::*;

    #[test]
    fn test_wall_clock_millis_exact() {
        // 1_000_000 ns device time + 2 ms offset = 3 ms wall clock.
        let offset = ClockOffset::from_nanos(2_000_000);
        assert_eq!(wall_clock_millis(1_000_000, offset), 3);
    }

    #[test]
    fn test_wall_clock_millis_truncates() {
        let offset = ClockOffset::from_nanos(0);
        assert_eq!(wall_clock_millis(1_999_999, offset), 1);
        assert_eq!(wall_clock_millis(999_999, offset), 0);
    }

    #[test]
    fn test_wall_clock_millis_negative_offset() {
        // Device clock ahead of host time yields a negative offset.
        let offset = ClockOffset::from_nanos(-4_000_000);
        assert_eq!(wall_clock_millis(9_000_000, offset), 5);
    }

    #[test]
    fn test_estimate_offset_brackets_host_time() {
        let transport = MockTransport::with_devices(1);
        let identity = CameraIdentity::new("EmuUsb", "40000001");
        let (tx, _rx) = unbounded();
        let mut device = transport.attach(&identity, tx).unwrap();

        let before = host_wall_clock_nanos();
        let offset = estimate_offset(device.as_mut()).unwrap();
        let after = host_wall_clock_nanos();

        // offset + device_clock must land between the two host readings.
        let device_ns = device.latch_timestamp().unwrap() as i64;
        let reconstructed = device_ns.wrapping_add(offset.as_nanos());
        assert!(reconstructed >= before - 1_000_000_000);
        assert!(reconstructed <= after + 1_000_000_000);
    }

    proptest! {
        #[test]
        fn prop_millis_matches_wide_arithmetic(
            device_ns in 0u64..(1u64 << 62),
            offset_ns in -1_000_000_000_000i64..1_000_000_000_000i64,
        ) {
            let expected = ((device_ns as i128) + (offset_ns as i128)) / 1_000_000;
            let got = wall_clock_millis(device_ns, ClockOffset::from_nanos(offset_ns));
            prop_assert_eq!(got as i128, expected);
        }
    }
}
