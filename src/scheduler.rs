//! Period-locked trigger cycle.
//!
//! The scheduler drives every attached session from one thread on a
//! fixed cadence. Deadlines are absolute — each is the previous deadline
//! plus one period — so per-cycle execution time never accumulates into
//! drift. Within a cycle all ready cameras are triggered in their attach
//! order before the scheduler sleeps; a camera that is not ready is
//! passed over for that cycle only.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::camera::{CameraTransport, DeviceError};
use crate::config::AcquisitionConfig;
use crate::session::{DeviceSession, SessionError};
use crate::shutdown::CancelToken;

/// Fatal conditions that stop the acquisition loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A non-removal error during readiness probing or triggering.
    #[error("trigger failed on camera {camera}: {source}")]
    Trigger {
        /// Serial of the failing camera.
        camera: String,
        /// Underlying device error.
        #[source]
        source: DeviceError,
    },
    /// Reattachment failed (ceiling expired or the transport broke).
    #[error("recovery failed for camera {camera}: {source}")]
    Recovery {
        /// Serial of the camera under recovery.
        camera: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
}

/// Absolute deadline sequence for the trigger cycle.
///
/// Deadlines form an arithmetic progression from the start instant:
/// `start + period`, `start + 2*period`, ... regardless of when they are
/// consumed.
#[derive(Debug, Clone)]
pub struct Cadence {
    next: Instant,
    period: Duration,
}

impl Cadence {
    /// Starts a deadline sequence at `start` with the given period.
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            next: start + period,
            period,
        }
    }

    /// Returns the next deadline and advances the sequence by exactly
    /// one period.
    pub fn advance(&mut self) -> Instant {
        let deadline = self.next;
        self.next += self.period;
        deadline
    }

    /// Returns the fixed period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Lifecycle of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not running.
    Idle,
    /// Executing the trigger cycle.
    Running,
    /// Terminated by a fatal error.
    Stopped,
}

/// Drives the fixed-period trigger cycle across all sessions.
pub struct AcquisitionScheduler {
    period: Duration,
    ready_timeout: Duration,
    settle_delay: Duration,
    state: SchedulerState,
}

impl AcquisitionScheduler {
    /// Creates a scheduler for the configured frame rate and timeouts.
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            period: config.period(),
            ready_timeout: config.ready_timeout,
            settle_delay: config.settle_delay,
            state: SchedulerState::Idle,
        }
    }

    /// Returns the current scheduler state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Runs the trigger cycle until cancellation or a fatal error.
    ///
    /// Removal-class failures pause only the affected sessions: all
    /// triggering stops for the cycle, the transport is given a settle
    /// delay to confirm the absence, the affected sessions are recovered
    /// (blocking), and the cadence restarts. Every other error stops the
    /// loop and propagates.
    pub fn run(
        &mut self,
        transport: &dyn CameraTransport,
        sessions: &mut [DeviceSession],
        config: &AcquisitionConfig,
        cancel: &CancelToken,
    ) -> Result<(), SchedulerError> {
        self.state = SchedulerState::Running;
        let result = self.run_loop(transport, sessions, config, cancel);
        self.state = match result {
            Ok(()) => SchedulerState::Idle,
            Err(_) => SchedulerState::Stopped,
        };
        result
    }

    fn run_loop(
        &self,
        transport: &dyn CameraTransport,
        sessions: &mut [DeviceSession],
        config: &AcquisitionConfig,
        cancel: &CancelToken,
    ) -> Result<(), SchedulerError> {
        tracing::info!(
            period_ms = self.period.as_millis() as u64,
            cameras = sessions.len(),
            "acquisition loop started"
        );
        let mut cadence = Cadence::new(Instant::now(), self.period);

        loop {
            if cancel.is_cancelled() {
                tracing::info!("acquisition loop leaving at cycle boundary");
                return Ok(());
            }

            match self.run_cycle(sessions)? {
                CycleOutcome::Completed => {}
                CycleOutcome::RemovalDetected => {
                    // Give the transport time to confirm the physical
                    // absence before trusting its removal report.
                    std::thread::sleep(self.settle_delay);
                    self.recover_removed(transport, sessions, config, cancel)?;
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    cadence = Cadence::new(Instant::now(), self.period);
                    continue;
                }
            }

            let deadline = cadence.advance();
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else {
                tracing::trace!("cycle overran its period");
            }
        }
    }

    /// Probes every armed session, then triggers the ready ones, keeping
    /// the trigger window as narrow as the probe results allow.
    fn run_cycle(
        &self,
        sessions: &mut [DeviceSession],
    ) -> Result<CycleOutcome, SchedulerError> {
        let mut ready = Vec::with_capacity(sessions.len());

        for (i, session) in sessions.iter_mut().enumerate() {
            match session.is_trigger_ready(self.ready_timeout) {
                Ok(true) => ready.push(i),
                Ok(false) => {
                    tracing::debug!(camera = %session.identity(), "not trigger-ready, skipping cycle");
                }
                Err(e) => return classify(session, e).map(|()| CycleOutcome::RemovalDetected),
            }
        }

        for &i in &ready {
            let session = &mut sessions[i];
            if let Err(e) = session.trigger() {
                return classify(session, e).map(|()| CycleOutcome::RemovalDetected);
            }
        }

        Ok(CycleOutcome::Completed)
    }

    fn recover_removed(
        &self,
        transport: &dyn CameraTransport,
        sessions: &mut [DeviceSession],
        config: &AcquisitionConfig,
        cancel: &CancelToken,
    ) -> Result<(), SchedulerError> {
        for session in sessions.iter_mut() {
            if !session.detect_removal() {
                continue;
            }
            match session.recover(transport, config, cancel) {
                Ok(()) => {}
                Err(SessionError::Device(DeviceError::Interrupted)) if cancel.is_cancelled() => {
                    tracing::info!(camera = %session.identity(), "recovery abandoned for shutdown");
                    return Ok(());
                }
                Err(e) => {
                    return Err(SchedulerError::Recovery {
                        camera: session.identity().serial().to_string(),
                        source: e,
                    });
                }
            }
        }
        Ok(())
    }
}

enum CycleOutcome {
    Completed,
    RemovalDetected,
}

/// Maps a per-session failure to either "removal detected" (`Ok`) or a
/// fatal scheduler error (`Err`).
fn classify(session: &DeviceSession, error: DeviceError) -> Result<(), SchedulerError> {
    if error.is_removal() || session.detect_removal() {
        tracing::warn!(camera = %session.identity(), error = %error, "removal-class condition");
        Ok(())
    } else {
        Err(SchedulerError::Trigger {
            camera: session.identity().serial().to_string(),
            source: error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraIdentity, MockTransport};
    use crate::config::{CaptureSettings, OutputMode};
    use proptest::prelude::*;
    use std::path::Path;

    #[test]
    fn test_cadence_is_arithmetic_sequence() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let mut cadence = Cadence::new(start, period);

        assert_eq!(cadence.advance(), start + period);
        assert_eq!(cadence.advance(), start + 2 * period);
        assert_eq!(cadence.advance(), start + 3 * period);
    }

    proptest! {
        #[test]
        fn prop_deadlines_independent_of_consumption_jitter(
            period_us in 1u64..1_000_000,
            count in 1u32..64,
        ) {
            let start = Instant::now();
            let period = Duration::from_micros(period_us);
            let mut cadence = Cadence::new(start, period);

            let mut deadline = start;
            for n in 1..=count {
                deadline = cadence.advance();
                prop_assert_eq!(deadline, start + n * period);
            }
            prop_assert_eq!(deadline, start + count * period);
        }
    }

    fn test_config(out_dir: &Path, frame_rate: f64) -> AcquisitionConfig {
        AcquisitionConfig {
            output_dir: out_dir.to_path_buf(),
            mode: OutputMode::Image,
            frame_rate,
            ready_timeout: Duration::from_millis(1),
            settle_delay: Duration::from_millis(40),
            reattach_poll: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn build_sessions(
        transport: &MockTransport,
        config: &AcquisitionConfig,
        serials: &[&str],
    ) -> Vec<DeviceSession> {
        serials
            .iter()
            .map(|serial| {
                let mut session = DeviceSession::attach(
                    transport,
                    CameraIdentity::new("EmuUsb", *serial),
                    CaptureSettings::default(),
                )
                .unwrap();
                session.configure(config).unwrap();
                session.arm().unwrap();
                session
            })
            .collect()
    }

    fn run_in_background(
        transport: MockTransport,
        mut sessions: Vec<DeviceSession>,
        config: AcquisitionConfig,
        cancel: CancelToken,
    ) -> std::thread::JoinHandle<Result<(), SchedulerError>> {
        std::thread::spawn(move || {
            let mut scheduler = AcquisitionScheduler::from_config(&config);
            let result = scheduler.run(&transport, &mut sessions, &config, &cancel);
            for session in &mut sessions {
                session.stop();
            }
            result
        })
    }

    #[test]
    fn test_all_not_ready_cycle_triggers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(2);
        let config = test_config(dir.path(), 50.0);
        let sessions = build_sessions(&transport, &config, &["40000001", "40000002"]);

        let a = transport.control("40000001").unwrap();
        let b = transport.control("40000002").unwrap();
        a.queue_not_ready(1000);
        b.queue_not_ready(1000);

        let cancel = CancelToken::new();
        let handle = run_in_background(transport, sessions, config, cancel.clone());
        std::thread::sleep(Duration::from_millis(150));
        cancel.cancel();

        let result = handle.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(a.triggers(), 0);
        assert_eq!(b.triggers(), 0);
    }

    #[test]
    fn test_non_removal_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let config = test_config(dir.path(), 50.0);
        let sessions = build_sessions(&transport, &config, &["40000001"]);

        let control = transport.control("40000001").unwrap();
        control.fail_next_trigger("buffer underrun");

        let cancel = CancelToken::new();
        let handle = run_in_background(transport, sessions, config, cancel);

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(SchedulerError::Trigger { .. })));
    }

    #[test]
    fn test_removal_pauses_then_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(1);
        let config = test_config(dir.path(), 50.0);
        let sessions = build_sessions(&transport, &config, &["40000001"]);
        let control = transport.control("40000001").unwrap();

        let cancel = CancelToken::new();
        let handle = run_in_background(transport, sessions, config, cancel.clone());

        std::thread::sleep(Duration::from_millis(100));
        control.unplug();
        let triggers_at_unplug = control.triggers();
        std::thread::sleep(Duration::from_millis(150));
        control.replug();
        std::thread::sleep(Duration::from_millis(250));

        let resumed = control.triggers();
        cancel.cancel();
        assert!(handle.join().unwrap().is_ok());

        assert!(
            resumed > triggers_at_unplug,
            "expected triggering to resume after reattachment \
             ({resumed} vs {triggers_at_unplug})"
        );
    }
}
