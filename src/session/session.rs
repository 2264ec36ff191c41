//! One camera's acquisition lifecycle.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::camera::{
    CameraDevice, CameraIdentity, CameraTransport, CapturedFrame, DeviceError,
};
use crate::clock;
use crate::config::{AcquisitionConfig, BalanceChannel, CaptureSettings, OutputMode};
use crate::shutdown::CancelToken;
use crate::sink::{FrameLog, FrameSink, ImageSink, SinkError, VideoSink};

use super::delivery::{DeliveryShared, DeliveryWorker};

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Propagated device/transport failure.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// Failure opening the session's outputs.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The delivery worker thread could not be started.
    #[error("failed to start delivery worker: {0}")]
    Worker(std::io::Error),
}

/// Where a session is in its lifecycle.
///
/// The normal path is `Unattached → Configuring → Armed`, then a
/// `Armed ↔ Triggered` loop per cycle. Removal takes
/// `Detached → Reattaching → Configuring` and re-enters the normal path
/// without resetting the frame index, output handles, or identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No live handle bound.
    Unattached,
    /// Parameters and outputs being applied.
    Configuring,
    /// Ready to accept a trigger.
    Armed,
    /// Trigger issued; frame in flight.
    Triggered,
    /// Device reported absent; handle released.
    Detached,
    /// Polling enumeration for the same physical device.
    Reattaching,
}

/// Camera parameter values actually in effect, read back from the device
/// after configuration. Automatic settings resolve to the device's real
/// current value, never to a placeholder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    /// Exposure time in microseconds.
    pub exposure_us: f64,
    /// Gain in camera-specific units.
    pub gain: f64,
    /// White-balance ratio, red channel.
    pub balance_red: f64,
    /// White-balance ratio, green channel.
    pub balance_green: f64,
    /// White-balance ratio, blue channel.
    pub balance_blue: f64,
}

/// Owns one camera for the lifetime of the process: its live handle,
/// clock offset, frame index, and output files.
///
/// The handle is replaced on reattachment; everything else persists, so
/// one physical device produces one contiguous log whatever happens to
/// the cable.
pub struct DeviceSession {
    identity: CameraIdentity,
    device: Option<Box<dyn CameraDevice>>,
    state: SessionState,
    settings: CaptureSettings,
    resolved: Option<ResolvedParams>,
    shared: Arc<DeliveryShared>,
    frame_tx: Option<Sender<CapturedFrame>>,
    frame_rx: Option<Receiver<CapturedFrame>>,
    worker: Option<DeliveryWorker>,
    session_start_ms: Option<i64>,
}

impl DeviceSession {
    /// Binds the camera with the given identity and creates its delivery
    /// channel. The session starts `Unattached` until configured.
    pub fn attach(
        transport: &dyn CameraTransport,
        identity: CameraIdentity,
        settings: CaptureSettings,
    ) -> Result<Self, SessionError> {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        let device = transport.attach(&identity, frame_tx.clone())?;
        tracing::info!(camera = %identity, model = device.model_name(), "using device");

        Ok(Self {
            identity,
            device: Some(device),
            state: SessionState::Unattached,
            settings,
            resolved: None,
            shared: Arc::new(DeliveryShared::new()),
            frame_tx: Some(frame_tx),
            frame_rx: Some(frame_rx),
            worker: None,
            session_start_ms: None,
        })
    }

    /// Applies the requested parameters, enables chunk metadata and
    /// software triggering, estimates the clock offset, and opens the
    /// session's outputs.
    ///
    /// Idempotent before [`Self::arm`]: a repeat call re-resolves the
    /// same values against unchanged device state and does not open a
    /// second set of outputs.
    pub fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), SessionError> {
        self.state = SessionState::Configuring;
        let device = self.device.as_mut().ok_or(DeviceError::NotAttached)?;

        let resolved = apply_settings(device.as_mut(), &self.settings)?;
        device.configure_software_trigger()?;
        device.enable_chunk_metadata()?;

        let offset = clock::estimate_offset(device.as_mut())?;
        self.shared.offset_ns.store(offset.as_nanos(), Ordering::SeqCst);

        let (width, height) = device.sensor_size();
        let start_ms = *self
            .session_start_ms
            .get_or_insert_with(clock::host_wall_clock_millis);

        tracing::info!(
            camera = %self.identity,
            mode = config.mode.label(),
            width,
            height,
            offset_ns = offset.as_nanos(),
            exposure_us = resolved.exposure_us,
            gain = resolved.gain,
            balance_red = resolved.balance_red,
            balance_green = resolved.balance_green,
            balance_blue = resolved.balance_blue,
            "camera configured"
        );
        self.resolved = Some(resolved);

        if self.worker.is_none() {
            let serial = self.identity.serial().to_string();
            let log = FrameLog::create(&config.output_dir, &serial, start_ms)?;
            let sink: Box<dyn FrameSink> = match config.mode {
                OutputMode::Image => Box::new(ImageSink::create(
                    &config.output_dir,
                    &serial,
                    config.jpeg_quality,
                )?),
                OutputMode::Video => Box::new(VideoSink::create(
                    &config.output_dir,
                    &serial,
                    start_ms,
                    config.jpeg_quality,
                )?),
            };
            if let Some(frame_rx) = self.frame_rx.take() {
                self.worker = Some(
                    DeliveryWorker::spawn(
                        serial,
                        config.mode.label(),
                        (
                            resolved.balance_red,
                            resolved.balance_green,
                            resolved.balance_blue,
                        ),
                        frame_rx,
                        log,
                        sink,
                        Arc::clone(&self.shared),
                    )
                    .map_err(SessionError::Worker)?,
                );
            }
        }

        Ok(())
    }

    /// Switches the device into triggered acquisition. Must complete
    /// before the scheduler issues the first trigger.
    pub fn arm(&mut self) -> Result<(), SessionError> {
        let device = self.device.as_mut().ok_or(DeviceError::NotAttached)?;
        device.start_acquisition()?;
        self.state = SessionState::Armed;
        Ok(())
    }

    /// True while the session participates in trigger cycles.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, SessionState::Armed | SessionState::Triggered)
    }

    /// Probes trigger readiness, waiting at most `timeout`.
    ///
    /// Sessions that are not armed (detached, reattaching) answer
    /// `false` so the scheduler simply passes over them.
    pub fn is_trigger_ready(&mut self, timeout: Duration) -> Result<bool, DeviceError> {
        if !self.is_armed() {
            return Ok(false);
        }
        if self.state == SessionState::Triggered {
            // The previous frame was delivered or skipped by now; the
            // device's own readiness below is authoritative.
            self.state = SessionState::Armed;
        }
        let device = self.device.as_mut().ok_or(DeviceError::NotAttached)?;
        device.is_trigger_ready(timeout)
    }

    /// Issues a single software trigger. The frame arrives later on the
    /// delivery channel. Calls while not armed are skipped, never queued.
    pub fn trigger(&mut self) -> Result<(), DeviceError> {
        if !self.is_armed() {
            return Ok(());
        }
        let device = self.device.as_mut().ok_or(DeviceError::NotAttached)?;
        device.execute_trigger()?;
        self.state = SessionState::Triggered;
        Ok(())
    }

    /// True when the transport reports the camera physically absent.
    pub fn detect_removal(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_removed())
    }

    /// Releases the dead handle and blocks until the same physical
    /// device reappears, then rebinds it, re-enables triggering and
    /// chunk metadata, and estimates a fresh clock offset.
    ///
    /// The frame index, output handles, and identity are deliberately
    /// not reset. Waits indefinitely unless a recovery ceiling is
    /// configured; the cancellation token is honored at every poll
    /// iteration.
    pub fn recover(
        &mut self,
        transport: &dyn CameraTransport,
        config: &AcquisitionConfig,
        cancel: &CancelToken,
    ) -> Result<(), SessionError> {
        tracing::warn!(camera = %self.identity, "device lost, waiting for reattachment");
        self.state = SessionState::Detached;
        if let Some(mut device) = self.device.take() {
            device.stop_acquisition();
        }

        self.state = SessionState::Reattaching;
        let started = Instant::now();
        let device = loop {
            if cancel.is_cancelled() {
                return Err(DeviceError::Interrupted.into());
            }
            if let Some(ceiling) = config.recovery_ceiling {
                if started.elapsed() >= ceiling {
                    return Err(DeviceError::ReattachTimeout(ceiling).into());
                }
            }

            let matches = transport
                .enumerate()?
                .into_iter()
                .filter(|id| *id == self.identity)
                .count();
            if matches == 1 {
                let frame_tx = self.frame_tx.clone().ok_or(DeviceError::NotAttached)?;
                match transport.attach(&self.identity, frame_tx) {
                    Ok(device) => break device,
                    Err(e) => {
                        // Lost again between enumerate and attach.
                        tracing::debug!(camera = %self.identity, error = %e, "reattach attempt failed");
                    }
                }
            }

            std::thread::sleep(config.reattach_poll);
        };

        self.device = Some(device);
        self.state = SessionState::Configuring;
        let device = self.device.as_mut().ok_or(DeviceError::NotAttached)?;
        device.configure_software_trigger()?;
        device.enable_chunk_metadata()?;
        let offset = clock::estimate_offset(device.as_mut())?;
        self.shared.offset_ns.store(offset.as_nanos(), Ordering::SeqCst);

        device.start_acquisition()?;
        self.state = SessionState::Armed;
        tracing::info!(
            camera = %self.identity,
            offset_ns = offset.as_nanos(),
            frame_index = self.shared.frame_index.load(Ordering::SeqCst),
            "device reattached"
        );
        Ok(())
    }

    /// Stops acquisition, drops the handle, and waits for the delivery
    /// worker to drain the channel and release the outputs. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop_acquisition();
        }
        self.frame_tx = None;
        self.frame_rx = None;
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
        self.state = SessionState::Unattached;
    }

    /// Returns the stable identity of the bound camera.
    pub fn identity(&self) -> &CameraIdentity {
        &self.identity
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the number of frames persisted so far.
    pub fn frame_index(&self) -> u64 {
        self.shared.frame_index.load(Ordering::SeqCst)
    }

    /// Returns the number of frames discarded for missing capture
    /// metadata.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::SeqCst)
    }

    /// Returns the clock offset of the current attachment, nanoseconds.
    pub fn offset_nanos(&self) -> i64 {
        self.shared.offset_ns.load(Ordering::SeqCst)
    }

    /// Returns the parameter values resolved at configure time.
    pub fn resolved_params(&self) -> Option<ResolvedParams> {
        self.resolved
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_settings(
    device: &mut dyn CameraDevice,
    settings: &CaptureSettings,
) -> Result<ResolvedParams, DeviceError> {
    Ok(ResolvedParams {
        exposure_us: device.set_exposure(settings.exposure)?,
        gain: device.set_gain(settings.gain)?,
        balance_red: device.set_balance(BalanceChannel::Red, settings.balance_red)?,
        balance_green: device.set_balance(BalanceChannel::Green, settings.balance_green)?,
        balance_blue: device.set_balance(BalanceChannel::Blue, settings.balance_blue)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::MockTransport;
    use crate::config::ParamSetting;
    use std::path::Path;

    fn test_config(out_dir: &Path) -> AcquisitionConfig {
        AcquisitionConfig {
            output_dir: out_dir.to_path_buf(),
            mode: OutputMode::Image,
            frame_rate: 10.0,
            reattach_poll: Duration::from_millis(20),
            settle_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn attach_session(transport: &MockTransport, serial: &str) -> DeviceSession {
        DeviceSession::attach(
            transport,
            CameraIdentity::new("EmuUsb", serial),
            CaptureSettings::default(),
        )
        .unwrap()
    }

    fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn test_configure_resolves_auto_params() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let mut session = attach_session(&transport, "40000001");

        session.configure(&test_config(dir.path())).unwrap();
        let resolved = session.resolved_params().unwrap();

        // Auto settings resolve to real device values, never a sentinel.
        assert_eq!(resolved.exposure_us, 10_000.0);
        assert_eq!(resolved.gain, 5.0);
        assert!(resolved.gain > 0.0);
        assert!(resolved.balance_red > 0.0);
    }

    #[test]
    fn test_fixed_exposure_with_auto_gain() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let mut session = DeviceSession::attach(
            &transport,
            CameraIdentity::new("EmuUsb", "40000001"),
            CaptureSettings {
                exposure: ParamSetting::Fixed(5000.0),
                ..Default::default()
            },
        )
        .unwrap();

        session.configure(&test_config(dir.path())).unwrap();
        let resolved = session.resolved_params().unwrap();

        assert_eq!(resolved.exposure_us, 5000.0);
        // The auto gain read-back is the device's value, not -1.
        assert_eq!(resolved.gain, 5.0);
        assert_ne!(resolved.gain, -1.0);
    }

    #[test]
    fn test_configure_idempotent_before_arm() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let mut session = attach_session(&transport, "40000001");
        let config = test_config(dir.path());

        session.configure(&config).unwrap();
        let first = session.resolved_params().unwrap();
        session.configure(&config).unwrap();
        let second = session.resolved_params().unwrap();

        assert_eq!(first, second);
        // No second set of outputs was opened.
        let logs: Vec<_> = std::fs::read_dir(dir.path().join("log")).unwrap().collect();
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_frame_flow_increments_index() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let mut session = attach_session(&transport, "40000001");
        let config = test_config(dir.path());

        session.configure(&config).unwrap();
        session.arm().unwrap();

        assert!(session.is_trigger_ready(Duration::from_millis(10)).unwrap());
        session.trigger().unwrap();
        wait_for("first frame", || session.frame_index() == 1);

        let images: Vec<_> = std::fs::read_dir(dir.path().join("img")).unwrap().collect();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn test_chunkless_frame_dropped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let control = transport.control("40000001").unwrap();
        let mut session = attach_session(&transport, "40000001");
        let config = test_config(dir.path());

        session.configure(&config).unwrap();
        session.arm().unwrap();

        control.omit_chunk_meta(1);
        session.trigger().unwrap();
        session.trigger().unwrap();

        wait_for("second frame persisted", || session.frame_index() == 1);
        assert_eq!(session.dropped_frames(), 1);
    }

    #[test]
    fn test_recovery_preserves_index_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let control = transport.control("40000001").unwrap();
        let mut session = attach_session(&transport, "40000001");
        let config = test_config(dir.path());
        let cancel = CancelToken::new();

        session.configure(&config).unwrap();
        session.arm().unwrap();
        session.trigger().unwrap();
        session.trigger().unwrap();
        wait_for("pre-removal frames", || session.frame_index() == 2);
        let offset_before = session.offset_nanos();

        control.unplug();
        assert!(session.detect_removal());
        assert!(matches!(session.trigger(), Err(DeviceError::Removed)));

        let replug = {
            let control = control.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(150));
                control.replug();
            })
        };
        session.recover(&transport, &config, &cancel).unwrap();
        replug.join().unwrap();

        assert_eq!(session.state(), SessionState::Armed);
        // Frame index survived; offset is a fresh estimate.
        assert_eq!(session.frame_index(), 2);
        assert_ne!(session.offset_nanos(), offset_before);

        session.trigger().unwrap();
        wait_for("post-recovery frame", || session.frame_index() == 3);

        // Still exactly one log file and no new sink files beyond the
        // per-frame images.
        let logs: Vec<_> = std::fs::read_dir(dir.path().join("log")).unwrap().collect();
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_recovery_ceiling_expires() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let control = transport.control("40000001").unwrap();
        let mut session = attach_session(&transport, "40000001");
        let mut config = test_config(dir.path());
        config.recovery_ceiling = Some(Duration::from_millis(80));
        let cancel = CancelToken::new();

        session.configure(&config).unwrap();
        session.arm().unwrap();
        control.unplug();

        let result = session.recover(&transport, &config, &cancel);
        assert!(matches!(
            result,
            Err(SessionError::Device(DeviceError::ReattachTimeout(_)))
        ));
    }

    #[test]
    fn test_recovery_honors_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let control = transport.control("40000001").unwrap();
        let mut session = attach_session(&transport, "40000001");
        let config = test_config(dir.path());

        session.configure(&config).unwrap();
        session.arm().unwrap();
        control.unplug();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = session.recover(&transport, &config, &cancel);
        assert!(matches!(
            result,
            Err(SessionError::Device(DeviceError::Interrupted))
        ));
    }
}
