//! Acquisition of the owned camera
//!
//! Turns an owner identity into an open session: enumerate, skip cameras
//! another process has claimed, open the rest one by one and keep the first
//! whose owner attribute matches exactly.

use crate::config::ControlsConfig;
use crate::errors::PhotoError;
use crate::platform::Backend;
use crate::session::CameraSession;
use crate::types::AcquisitionPhase;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct LinkState {
    phase: Mutex<AcquisitionPhase>,
    connected: AtomicBool,
    configured: AtomicBool,
}

/// Acquisition phase and the published session flags.
///
/// Readers never touch the session guard, so readiness queries answer
/// immediately even while a focus cycle or a transfer holds the device.
#[derive(Debug, Clone, Default)]
pub struct PhaseCell(Arc<LinkState>);

impl PhaseCell {
    pub fn get(&self) -> AcquisitionPhase {
        *self.0.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, phase: AcquisitionPhase) {
        *self.0.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Publish the state of the session installed behind the guard
    pub fn publish_session(&self, connected: bool, configured: bool) {
        self.0.connected.store(connected, Ordering::Release);
        self.0.configured.store(configured, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::Acquire)
    }

    /// Connected and configured
    pub fn is_ready(&self) -> bool {
        self.is_connected() && self.0.configured.load(Ordering::Acquire)
    }
}

pub struct Acquirer {
    backend: Backend,
    controls: ControlsConfig,
    event_wait: Duration,
    phase: PhaseCell,
}

impl Acquirer {
    pub fn new(backend: Backend, controls: ControlsConfig, event_wait: Duration, phase: PhaseCell) -> Self {
        Self {
            backend,
            controls,
            event_wait,
            phase,
        }
    }

    /// One full pass over the bus. Each call starts from a fresh enumeration.
    pub fn attempt_acquire(&self, owner: &str) -> Result<CameraSession, PhotoError> {
        self.phase.set(AcquisitionPhase::Seeking);
        let not_found = || PhotoError::NoDeviceFound {
            owner: owner.to_string(),
        };

        let candidates = self.backend.enumerator.list_candidates();
        if candidates.is_empty() {
            log::trace!("No cameras on the bus");
            return Err(not_found());
        }

        for candidate in &candidates {
            if self.backend.claims.is_claimed(candidate) {
                log::debug!("Device on {} is already claimed", candidate.port);
                continue;
            }

            let mut session = CameraSession::new(self.controls.clone(), self.event_wait);
            if let Err(e) = session.open(self.backend.driver.as_ref(), candidate) {
                log::warn!("Could not open camera on {}: {}", candidate.port, e);
                session.close();
                continue;
            }

            self.phase.set(AcquisitionPhase::Verifying);
            match session.get_config(&self.controls.owner_key) {
                Ok(value) if value == owner => {
                    // Stays Verifying until the caller configures and publishes it
                    log::warn!("Initializing owner: {} on port {}", value, candidate.port);
                    return Ok(session);
                }
                Ok(value) => {
                    log::debug!(
                        "Owner '{}' on port {} does not match '{}'",
                        value,
                        candidate.port,
                        owner
                    );
                }
                Err(e) => {
                    log::debug!("Cannot read owner on port {}: {}", candidate.port, e);
                }
            }
            session.close();
            self.phase.set(AcquisitionPhase::Seeking);
        }

        Err(not_found())
    }
}
