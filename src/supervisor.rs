//! Supervisory reconnection loop
//!
//! Keeps the node attached to its owned camera for the life of the process.
//! While acquired it checks that the recorded port is still on the bus; once
//! the camera is gone it tears the session down and seeks again until the
//! same owner shows up, then reapplies the exposure.

use crate::acquisition::{Acquirer, PhaseCell};
use crate::config::TimingConfig;
use crate::errors::PhotoError;
use crate::platform::DeviceEnumerator;
use crate::session::SharedSession;
use crate::timing::StopSignal;
use crate::tracker::PictureTracker;
use crate::types::{AcquisitionPhase, ExposureSettings};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Outcome of one supervisor pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStep {
    /// Acquired and still present
    Healthy,
    /// The acquired camera left the bus and the session was closed
    Disconnected,
    /// The owned camera was found, configured and handed to the tracker
    Acquired,
    /// Nothing acquired this pass
    Retry,
}

pub struct Supervisor {
    owner: String,
    exposure: ExposureSettings,
    acquirer: Acquirer,
    enumerator: Arc<dyn DeviceEnumerator>,
    shared: Arc<SharedSession>,
    tracker: Arc<PictureTracker>,
    phase: PhaseCell,
    timing: TimingConfig,
    acquisitions: u64,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: String,
        exposure: ExposureSettings,
        acquirer: Acquirer,
        enumerator: Arc<dyn DeviceEnumerator>,
        shared: Arc<SharedSession>,
        tracker: Arc<PictureTracker>,
        phase: PhaseCell,
        timing: TimingConfig,
    ) -> Self {
        Self {
            owner,
            exposure,
            acquirer,
            enumerator,
            shared,
            tracker,
            phase,
            timing,
            acquisitions: 0,
        }
    }

    /// Number of successful acquisitions so far, including the first
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn step(&mut self) -> Result<SupervisorStep, PhotoError> {
        let port = {
            let guard = self.shared.lock()?;
            guard.session.port().map(str::to_string)
        };

        match port {
            Some(port) => self.check_presence(&port),
            None => self.seek(),
        }
    }

    fn check_presence(&mut self, port: &str) -> Result<SupervisorStep, PhotoError> {
        if self.enumerator.is_present(port) {
            return Ok(SupervisorStep::Healthy);
        }

        self.tracker.stop();
        {
            let mut guard = self.shared.lock()?;
            // Only tear down the session we checked
            if guard.session.port() == Some(port) {
                guard.session.close();
            }
            self.phase
                .publish_session(guard.session.is_connected(), guard.session.is_configured());
        }
        self.phase.set(AcquisitionPhase::Seeking);
        log::warn!("Camera {} DISCONNECTED on port {}", self.owner, port);
        Ok(SupervisorStep::Disconnected)
    }

    fn seek(&mut self) -> Result<SupervisorStep, PhotoError> {
        let mut session = match self.acquirer.attempt_acquire(&self.owner) {
            Ok(session) => session,
            Err(e) => {
                log::debug!("Acquisition attempt failed: {}", e);
                return Ok(SupervisorStep::Retry);
            }
        };

        // Configure before publishing, so callers never see an unconfigured camera
        let report = match session.apply_config(&self.exposure) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Could not configure camera {}: {}", self.owner, e);
                session.close();
                self.phase.set(AcquisitionPhase::Seeking);
                return Ok(SupervisorStep::Retry);
            }
        };
        if let Err(e) = report.into_result() {
            // Partial configuration stands; the camera is still usable
            log::warn!("Camera {} configured with errors: {}", self.owner, e);
        }

        let port = session.port().unwrap_or_default().to_string();
        let session_id = session.session_id();
        {
            let mut guard = self.shared.lock()?;
            guard.session = session;
            self.phase
                .publish_session(guard.session.is_connected(), guard.session.is_configured());
        }
        self.tracker.start();
        self.phase.set(AcquisitionPhase::Acquired);
        self.acquisitions += 1;

        if self.acquisitions > 1 {
            log::warn!(
                "Camera {} reconnected on port {}, reconfiguring (session {:?})",
                self.owner,
                port,
                session_id
            );
        } else {
            log::warn!(
                "Camera {} acquired on port {} (session {:?})",
                self.owner,
                port,
                session_id
            );
        }
        Ok(SupervisorStep::Acquired)
    }

    /// Pass period after a given outcome
    fn period_after(&self, step: SupervisorStep) -> Duration {
        match step {
            SupervisorStep::Retry => self.timing.reconnect_backoff(),
            _ => self.timing.presence_check_interval(),
        }
    }

    pub fn run(mut self, stop: StopSignal) {
        let mut announced_search = false;
        loop {
            let step = match self.step() {
                Ok(step) => step,
                Err(e) => {
                    log::error!("Supervisor pass failed: {}", e);
                    SupervisorStep::Retry
                }
            };

            match step {
                SupervisorStep::Retry if !announced_search => {
                    log::warn!("Camera {} not found, retrying", self.owner);
                    announced_search = true;
                }
                SupervisorStep::Acquired => announced_search = false,
                _ => {}
            }

            if stop.sleep(self.period_after(step)) {
                break;
            }
        }

        self.tracker.stop();
        if let Ok(mut guard) = self.shared.lock() {
            guard.session.close();
        }
        self.phase.publish_session(false, false);
        self.phase.set(AcquisitionPhase::Seeking);
        log::debug!("Supervisor thread exiting");
    }

    pub fn spawn(self, stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("crabphoto-supervisor".to_string())
            .spawn(move || self.run(stop))
    }
}
