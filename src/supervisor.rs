//! Top-level capture ownership.
//!
//! The supervisor owns the transport (and with it the vendor stack's
//! process-scoped initialization), the per-camera sessions, and the
//! scheduler. It is the boundary where error classes separate: anything
//! recoverable was already handled below; what it returns is terminal
//! and maps to the process exit code.

use thiserror::Error;

use crate::camera::{CameraTransport, DeviceError};
use crate::config::{AcquisitionConfig, ConfigError};
use crate::scheduler::{AcquisitionScheduler, SchedulerError};
use crate::session::{DeviceSession, SessionError};
use crate::shutdown::CancelToken;

/// Terminal acquisition failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device discovery found nothing to capture from.
    #[error("no camera present")]
    NoCamerasFound,
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The transport layer failed before acquisition began.
    #[error("failed to enumerate cameras: {0}")]
    Transport(#[source] DeviceError),
    /// A camera could not be configured or armed.
    #[error("failed to set up camera {camera}: {source}")]
    Setup {
        /// Serial of the failing camera.
        camera: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// The acquisition loop hit a fatal condition.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Owns the whole capture pipeline: transport, sessions, scheduler.
///
/// Dropping the supervisor releases every session's output resources,
/// whatever path execution took to get there.
pub struct CaptureSupervisor {
    transport: Box<dyn CameraTransport>,
    config: AcquisitionConfig,
    scheduler: AcquisitionScheduler,
    sessions: Vec<DeviceSession>,
}

impl CaptureSupervisor {
    /// Validates the configuration and wraps the transport.
    pub fn new(
        transport: Box<dyn CameraTransport>,
        config: AcquisitionConfig,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        let scheduler = AcquisitionScheduler::from_config(&config);
        Ok(Self {
            transport,
            config,
            scheduler,
            sessions: Vec::new(),
        })
    }

    /// Discovers cameras, then configures and arms one session per
    /// device up to the configured maximum.
    ///
    /// Zero discovered devices is fatal, as is any camera that cannot be
    /// configured (e.g. missing chunk-metadata support).
    pub fn start(&mut self) -> Result<(), CaptureError> {
        let mut identities = self.transport.enumerate().map_err(CaptureError::Transport)?;
        if identities.is_empty() {
            return Err(CaptureError::NoCamerasFound);
        }
        if identities.len() > self.config.max_cameras {
            tracing::warn!(
                found = identities.len(),
                using = self.config.max_cameras,
                "more cameras than configured maximum"
            );
            identities.truncate(self.config.max_cameras);
        }

        for identity in identities {
            let built = DeviceSession::attach(
                self.transport.as_ref(),
                identity.clone(),
                self.config.settings,
            )
            .and_then(|mut session| {
                session.configure(&self.config)?;
                session.arm()?;
                Ok(session)
            });

            match built {
                Ok(session) => self.sessions.push(session),
                Err(source) => {
                    self.stop();
                    return Err(CaptureError::Setup {
                        camera: identity.serial().to_string(),
                        source,
                    });
                }
            }
        }

        tracing::info!(cameras = self.sessions.len(), "capture started");
        Ok(())
    }

    /// Drives the acquisition loop until cancellation or a fatal error,
    /// then releases all sessions regardless of the outcome.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<(), CaptureError> {
        let result = self.scheduler.run(
            self.transport.as_ref(),
            &mut self.sessions,
            &self.config,
            cancel,
        );
        self.stop();
        result.map_err(CaptureError::from)
    }

    /// Stops every session and releases its outputs. Idempotent; also
    /// invoked from `Drop` so no exit path leaks an open sink.
    pub fn stop(&mut self) {
        for session in &mut self.sessions {
            session.stop();
        }
    }

    /// Returns the sessions, e.g. for post-run inspection.
    pub fn sessions(&self) -> &[DeviceSession] {
        &self.sessions
    }
}

impl Drop for CaptureSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
