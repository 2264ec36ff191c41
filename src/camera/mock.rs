//! Emulated camera transport.
//!
//! Implements [`CameraTransport`]/[`CameraDevice`] without hardware so the
//! full acquisition pipeline can run in tests and in the demo binary.
//! Devices are scriptable: tests can unplug and replug them, queue
//! not-ready cycles, withhold chunk metadata, and inject trigger faults.
//!
//! A replug models a power cycle: the emulated device clock restarts from
//! its base value, so a freshly estimated offset after reattachment will
//! differ from the previous one, just as with real hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::config::{BalanceChannel, ParamSetting};

use super::{CameraDevice, CameraIdentity, CameraTransport, CapturedFrame, ChunkMeta, DeviceError};

/// Device class reported by every emulated camera.
pub const MOCK_DEVICE_CLASS: &str = "EmuUsb";

const SENSOR_WIDTH: u32 = 64;
const SENSOR_HEIGHT: u32 = 48;

/// Emulated device clock advance per trigger, in nanoseconds.
const CLOCK_TICK_NS: u64 = 1_000_000;

/// Device clock value after power-up.
const CLOCK_BASE_NS: u64 = 5_000_000_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current parameter values held by an emulated camera.
///
/// The defaults stand in for what auto-exposure/auto-gain/auto-balance
/// would have converged to; an automatic setting reads these back.
#[derive(Debug, Clone)]
struct MockParams {
    exposure_us: f64,
    gain: f64,
    balance_red: f64,
    balance_green: f64,
    balance_blue: f64,
}

impl Default for MockParams {
    fn default() -> Self {
        Self {
            exposure_us: 10_000.0,
            gain: 5.0,
            balance_red: 1.2,
            balance_green: 1.0,
            balance_blue: 1.6,
        }
    }
}

struct MockState {
    identity: CameraIdentity,
    model: String,
    supports_chunks: bool,
    present: AtomicBool,
    clock_ns: AtomicU64,
    params: Mutex<MockParams>,
    ready_plan: Mutex<VecDeque<bool>>,
    chunkless_budget: AtomicU64,
    trigger_fault: Mutex<Option<String>>,
    triggers: AtomicU64,
    acquiring: AtomicBool,
    chunk_enabled: AtomicBool,
}

impl MockState {
    fn new(serial: &str, supports_chunks: bool) -> Self {
        Self {
            identity: CameraIdentity::new(MOCK_DEVICE_CLASS, serial),
            model: format!("Emulated acA1920 ({serial})"),
            supports_chunks,
            present: AtomicBool::new(true),
            clock_ns: AtomicU64::new(CLOCK_BASE_NS),
            params: Mutex::new(MockParams::default()),
            ready_plan: Mutex::new(VecDeque::new()),
            chunkless_budget: AtomicU64::new(0),
            trigger_fault: Mutex::new(None),
            triggers: AtomicU64::new(0),
            acquiring: AtomicBool::new(false),
            chunk_enabled: AtomicBool::new(false),
        }
    }
}

/// Emulated camera transport; clones share one device population.
#[derive(Clone, Default)]
pub struct MockTransport {
    devices: Arc<Mutex<Vec<Arc<MockState>>>>,
}

impl MockTransport {
    /// Creates a transport with no devices plugged in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport populated with `count` emulated cameras,
    /// serials `40000001`, `40000002`, ...
    pub fn with_devices(count: usize) -> Self {
        let transport = Self::new();
        for i in 0..count {
            transport.add_device(&format!("{}", 40_000_001 + i as u64));
        }
        transport
    }

    /// Plugs in a new emulated camera and returns its control handle.
    pub fn add_device(&self, serial: &str) -> MockDeviceControl {
        let state = Arc::new(MockState::new(serial, true));
        lock(&self.devices).push(Arc::clone(&state));
        MockDeviceControl { state }
    }

    /// Plugs in a camera that lacks the chunk-metadata capability.
    pub fn add_device_without_chunks(&self, serial: &str) -> MockDeviceControl {
        let state = Arc::new(MockState::new(serial, false));
        lock(&self.devices).push(Arc::clone(&state));
        MockDeviceControl { state }
    }

    /// Returns the control handle for the device with the given serial.
    pub fn control(&self, serial: &str) -> Option<MockDeviceControl> {
        lock(&self.devices)
            .iter()
            .find(|s| s.identity.serial() == serial)
            .map(|s| MockDeviceControl {
                state: Arc::clone(s),
            })
    }
}

impl CameraTransport for MockTransport {
    fn enumerate(&self) -> Result<Vec<CameraIdentity>, DeviceError> {
        Ok(lock(&self.devices)
            .iter()
            .filter(|s| s.present.load(Ordering::SeqCst))
            .map(|s| s.identity.clone())
            .collect())
    }

    fn attach(
        &self,
        identity: &CameraIdentity,
        frames: Sender<CapturedFrame>,
    ) -> Result<Box<dyn CameraDevice>, DeviceError> {
        let state = lock(&self.devices)
            .iter()
            .find(|s| &s.identity == identity && s.present.load(Ordering::SeqCst))
            .map(Arc::clone)
            .ok_or_else(|| DeviceError::Vendor(format!("device not found: {identity}")))?;

        // A freshly attached handle starts with acquisition stopped and
        // chunk delivery disabled, like a real device after power-up.
        state.acquiring.store(false, Ordering::SeqCst);
        state.chunk_enabled.store(false, Ordering::SeqCst);

        tracing::debug!(camera = %identity, model = %state.model, "device attached");
        Ok(Box::new(MockDevice { state, frames }))
    }
}

/// Test/demo handle for steering one emulated camera.
#[derive(Clone)]
pub struct MockDeviceControl {
    state: Arc<MockState>,
}

impl MockDeviceControl {
    /// Returns the device identity.
    pub fn identity(&self) -> &CameraIdentity {
        &self.state.identity
    }

    /// Simulates pulling the cable. Every subsequent device operation
    /// fails with a removal-class error until [`Self::replug`].
    pub fn unplug(&self) {
        self.state.present.store(false, Ordering::SeqCst);
        tracing::debug!(camera = %self.state.identity, "device unplugged");
    }

    /// Simulates reconnecting the cable. The device clock restarts from
    /// its power-up base value.
    pub fn replug(&self) {
        self.state.clock_ns.store(CLOCK_BASE_NS, Ordering::SeqCst);
        self.state.present.store(true, Ordering::SeqCst);
        tracing::debug!(camera = %self.state.identity, "device replugged");
    }

    /// Queues `count` trigger-readiness probes that will answer false.
    pub fn queue_not_ready(&self, count: usize) {
        lock(&self.state.ready_plan).extend(std::iter::repeat(false).take(count));
    }

    /// Makes the next `count` frames arrive without chunk metadata.
    pub fn omit_chunk_meta(&self, count: u64) {
        self.state.chunkless_budget.fetch_add(count, Ordering::SeqCst);
    }

    /// Makes the next trigger fail with a non-removal vendor error.
    pub fn fail_next_trigger(&self, message: &str) {
        *lock(&self.state.trigger_fault) = Some(message.to_string());
    }

    /// Returns the number of triggers the device has executed.
    pub fn triggers(&self) -> u64 {
        self.state.triggers.load(Ordering::SeqCst)
    }
}

struct MockDevice {
    state: Arc<MockState>,
    frames: Sender<CapturedFrame>,
}

impl MockDevice {
    fn ensure_present(&self) -> Result<(), DeviceError> {
        if self.state.present.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::Removed)
        }
    }

    fn synthesize_buffer(&self, frame_number: u64) -> Vec<u8> {
        let seed = self
            .state
            .identity
            .serial()
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let len = (SENSOR_WIDTH as usize) * (SENSOR_HEIGHT as usize) * 3;
        (0..len)
            .map(|i| ((i as u64) ^ seed ^ frame_number.wrapping_mul(7)) as u8)
            .collect()
    }
}

impl CameraDevice for MockDevice {
    fn identity(&self) -> &CameraIdentity {
        &self.state.identity
    }

    fn model_name(&self) -> &str {
        &self.state.model
    }

    fn sensor_size(&self) -> (u32, u32) {
        (SENSOR_WIDTH, SENSOR_HEIGHT)
    }

    fn set_exposure(&mut self, setting: ParamSetting) -> Result<f64, DeviceError> {
        self.ensure_present()?;
        let mut params = lock(&self.state.params);
        if let ParamSetting::Fixed(value) = setting {
            params.exposure_us = value;
        }
        Ok(params.exposure_us)
    }

    fn set_gain(&mut self, setting: ParamSetting) -> Result<f64, DeviceError> {
        self.ensure_present()?;
        let mut params = lock(&self.state.params);
        if let ParamSetting::Fixed(value) = setting {
            params.gain = value;
        }
        Ok(params.gain)
    }

    fn set_balance(
        &mut self,
        channel: BalanceChannel,
        setting: ParamSetting,
    ) -> Result<f64, DeviceError> {
        self.ensure_present()?;
        let mut params = lock(&self.state.params);
        let slot = match channel {
            BalanceChannel::Red => &mut params.balance_red,
            BalanceChannel::Green => &mut params.balance_green,
            BalanceChannel::Blue => &mut params.balance_blue,
        };
        if let ParamSetting::Fixed(value) = setting {
            *slot = value;
        }
        Ok(*slot)
    }

    fn enable_chunk_metadata(&mut self) -> Result<(), DeviceError> {
        self.ensure_present()?;
        if !self.state.supports_chunks {
            return Err(DeviceError::Unsupported(
                "chunk metadata delivery".to_string(),
            ));
        }
        self.state.chunk_enabled.store(true, Ordering::SeqCst);
        tracing::debug!(camera = %self.state.identity, "chunk metadata enabled");
        Ok(())
    }

    fn configure_software_trigger(&mut self) -> Result<(), DeviceError> {
        self.ensure_present()?;
        tracing::debug!(camera = %self.state.identity, "software trigger configured");
        Ok(())
    }

    fn latch_timestamp(&mut self) -> Result<u64, DeviceError> {
        self.ensure_present()?;
        Ok(self.state.clock_ns.load(Ordering::SeqCst))
    }

    fn start_acquisition(&mut self) -> Result<(), DeviceError> {
        self.ensure_present()?;
        self.state.acquiring.store(true, Ordering::SeqCst);
        tracing::debug!(camera = %self.state.identity, "acquisition started");
        Ok(())
    }

    fn stop_acquisition(&mut self) {
        self.state.acquiring.store(false, Ordering::SeqCst);
        tracing::debug!(camera = %self.state.identity, "acquisition stopped");
    }

    fn is_trigger_ready(&mut self, _timeout: Duration) -> Result<bool, DeviceError> {
        self.ensure_present()?;
        if !self.state.acquiring.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(lock(&self.state.ready_plan).pop_front().unwrap_or(true))
    }

    fn execute_trigger(&mut self) -> Result<(), DeviceError> {
        self.ensure_present()?;
        if let Some(message) = lock(&self.state.trigger_fault).take() {
            return Err(DeviceError::Vendor(message));
        }

        let frame_number = self.state.triggers.fetch_add(1, Ordering::SeqCst);
        let timestamp_ns =
            self.state.clock_ns.fetch_add(CLOCK_TICK_NS, Ordering::SeqCst) + CLOCK_TICK_NS;

        let chunk = if !self.state.chunk_enabled.load(Ordering::SeqCst) {
            None
        } else {
            let budget = &self.state.chunkless_budget;
            let withheld = budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
                .is_ok();
            if withheld {
                None
            } else {
                let params = lock(&self.state.params);
                Some(ChunkMeta {
                    timestamp_ns,
                    exposure_us: params.exposure_us,
                    gain: params.gain,
                })
            }
        };

        let frame = CapturedFrame::new(
            self.synthesize_buffer(frame_number),
            SENSOR_WIDTH,
            SENSOR_HEIGHT,
            chunk,
        );
        // The session may already be draining its channel during shutdown;
        // a dropped receiver just discards the frame.
        let _ = self.frames.send(frame);
        Ok(())
    }

    fn is_removed(&self) -> bool {
        !self.state.present.load(Ordering::SeqCst)
    }
}
