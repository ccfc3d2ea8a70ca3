//! Camera session
//!
//! `CameraSession` owns the open handle to the one claimed camera and walks
//! the Closed → Open → Configured state machine. It lives inside
//! `SharedSession`, whose mutex is the single guard every device operation
//! goes through, so holding `&mut CameraSession` means holding the guard.

use crate::config::ControlsConfig;
use crate::errors::PhotoError;
use crate::ledger::CaptureLedger;
use crate::platform::{CameraDevice, CameraDriver};
use crate::types::{DeviceCandidate, ExposureSettings, PicturePath, SessionState};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Settings the device refused during `apply_config`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub rejected: Vec<(String, String)>,
}

impl ConfigReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// `ConfigError` naming every rejected key, if any
    pub fn into_result(self) -> Result<(), PhotoError> {
        if self.rejected.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = self.rejected.into_iter().map(|(key, _)| key).collect();
        Err(PhotoError::config(
            &keys.join(","),
            "setting rejected by the device",
        ))
    }
}

pub struct CameraSession {
    device: Option<Box<dyn CameraDevice>>,
    state: SessionState,
    session_id: Option<Uuid>,
    controls: ControlsConfig,
    event_wait: Duration,
}

impl CameraSession {
    pub fn new(controls: ControlsConfig, event_wait: Duration) -> Self {
        Self {
            device: None,
            state: SessionState::Closed,
            session_id: None,
            controls,
            event_wait,
        }
    }

    /// Closed → Open
    pub fn open(
        &mut self,
        driver: &dyn CameraDriver,
        candidate: &DeviceCandidate,
    ) -> Result<(), PhotoError> {
        self.close();
        let device = driver.open(candidate)?;
        self.device = Some(device);
        self.state = SessionState::Open;
        self.session_id = Some(Uuid::new_v4());
        Ok(())
    }

    /// Open → Configured. Rejected settings are reported, not rolled back.
    pub fn apply_config(&mut self, settings: &ExposureSettings) -> Result<ConfigReport, PhotoError> {
        let controls = self.controls.clone();
        let device = self.device_mut()?;

        log::info!(
            "Setting aperture/shutterspeed/iso: {}/{}/{}",
            settings.aperture,
            settings.shutter_speed,
            settings.iso
        );

        let sequence = [
            (&controls.aperture_key, &settings.aperture),
            (&controls.shutter_speed_key, &settings.shutter_speed),
            (&controls.iso_key, &settings.iso),
            (&controls.capture_target_key, &controls.capture_target_value),
            (&controls.clock_sync_key, &controls.clock_sync_value),
        ];

        let mut report = ConfigReport::default();
        for (key, value) in sequence {
            if let Err(e) = device.set_config(key, value) {
                log::warn!("Camera rejected {}={}: {}", key, value, e);
                report.rejected.push((key.clone(), value.clone()));
            }
        }

        self.state = SessionState::Configured;
        Ok(report)
    }

    /// Any state → Closed. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            log::debug!("Closing camera session on {}", device.port());
            device.close();
        }
        self.state = SessionState::Closed;
        self.session_id = None;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Closed
    }

    pub fn is_configured(&self) -> bool {
        self.state == SessionState::Configured
    }

    pub fn port(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.port())
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn get_config(&mut self, key: &str) -> Result<String, PhotoError> {
        self.device_mut()?.get_config(key)
    }

    pub fn set_config(&mut self, key: &str, value: &str) -> Result<(), PhotoError> {
        self.device_mut()?.set_config(key, value)
    }

    /// Fire the shutter. Completion shows up later as a capture event.
    pub fn trigger_remote_release(&mut self) -> Result<(), PhotoError> {
        let (key, value) = (
            self.controls.release_key.clone(),
            self.controls.trigger_value.clone(),
        );
        self.set_config(&key, &value)
    }

    /// Release a locked shutter state left behind by a trigger
    pub fn unlock(&mut self) -> Result<(), PhotoError> {
        let (key, value) = (
            self.controls.release_key.clone(),
            self.controls.unlock_value.clone(),
        );
        self.set_config(&key, &value)
    }

    pub fn drive_autofocus(&mut self) -> Result<(), PhotoError> {
        let key = self.controls.autofocus_key.clone();
        self.set_config(&key, "true")
    }

    pub fn cancel_autofocus(&mut self) -> Result<(), PhotoError> {
        let key = self.controls.cancel_autofocus_key.clone();
        self.set_config(&key, "true")
    }

    /// Drive autofocus, let the lens settle, cancel. Both steps always run.
    pub fn focus(&mut self, settle: Duration) -> Result<(), PhotoError> {
        let drive = self.drive_autofocus();
        std::thread::sleep(settle);
        let cancel = self.cancel_autofocus();
        drive.and(cancel)
    }

    /// Copy a picture to `destination`, which must not exist yet
    pub fn download_file(&mut self, remote: &PicturePath, destination: &Path) -> Result<(), PhotoError> {
        if destination.exists() {
            return Err(PhotoError::IoError(format!(
                "Destination {} already exists",
                destination.display()
            )));
        }
        self.device_mut()?.download_file(remote, destination)
    }

    pub fn delete_file(&mut self, remote: &PicturePath) -> Result<(), PhotoError> {
        self.device_mut()?.delete_file(remote)
    }

    /// Non-blocking check for a new file. A closed session has no events.
    pub fn poll_captured_event(&mut self) -> Result<Option<PicturePath>, PhotoError> {
        let wait = self.event_wait;
        match self.device.as_mut() {
            Some(device) => device.poll_event(wait),
            None => Ok(None),
        }
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn CameraDevice>, PhotoError> {
        self.device.as_mut().ok_or(PhotoError::NotReady)
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything behind the session guard
pub struct DeviceState {
    pub session: CameraSession,
    pub ledger: CaptureLedger,
}

/// The session guard plus a condition variable signalled on ledger changes
pub struct SharedSession {
    state: Mutex<DeviceState>,
    captures: Condvar,
    released: AtomicBool,
}

impl SharedSession {
    pub fn new(session: CameraSession) -> Self {
        Self {
            state: Mutex::new(DeviceState {
                session,
                ledger: CaptureLedger::new(),
            }),
            captures: Condvar::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, DeviceState>, PhotoError> {
        Ok(self.state.lock()?)
    }

    /// Wake callers blocked in `wait_for_settled`
    pub fn notify_captures(&self) {
        self.captures.notify_all();
    }

    /// Fail every current and future `wait_for_settled` with `NotReady`
    pub fn release_waiters(&self) {
        self.released.store(true, Ordering::Release);
        // Waiters check the flag under the guard
        drop(self.state.lock());
        self.captures.notify_all();
    }

    /// Block until every trigger has a reported picture, logging progress
    /// every `status_every`. Returns with the guard held.
    pub fn wait_for_settled(
        &self,
        status_every: Duration,
    ) -> Result<MutexGuard<'_, DeviceState>, PhotoError> {
        let mut guard = self.lock()?;
        while !guard.ledger.is_settled() {
            if self.released.load(Ordering::Acquire) {
                return Err(PhotoError::NotReady);
            }
            let (next, wait) = self.captures.wait_timeout(guard, status_every)?;
            guard = next;
            if wait.timed_out() && !guard.ledger.is_settled() {
                log::warn!(
                    "Waiting to receive remaining picture paths from camera (trigger count: {}, pictures: {})",
                    guard.ledger.trigger_count(),
                    guard.ledger.len()
                );
            }
        }
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBus, MockCamera};
    use std::sync::Arc;

    fn open_session(bus: &MockBus, port: &str) -> CameraSession {
        let candidate = bus
            .candidates()
            .into_iter()
            .find(|c| c.port == port)
            .unwrap();
        let mut session = CameraSession::new(ControlsConfig::default(), Duration::ZERO);
        session.open(bus, &candidate).unwrap();
        session
    }

    fn exposure() -> ExposureSettings {
        ExposureSettings {
            aperture: "8".to_string(),
            shutter_speed: "1/100".to_string(),
            iso: "400".to_string(),
        }
    }

    #[test]
    fn test_state_machine_transitions() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));

        let mut session = open_session(&bus, "usb:001,004");
        assert_eq!(session.state(), SessionState::Open);
        assert!(session.is_connected());
        assert!(!session.is_configured());
        assert!(session.session_id().is_some());

        let report = session.apply_config(&exposure()).unwrap();
        assert!(report.is_complete());
        assert_eq!(session.state(), SessionState::Configured);

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.port().is_none());
    }

    #[test]
    fn test_apply_config_sequence_and_values() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let mut session = open_session(&bus, "usb:001,004");

        session.apply_config(&exposure()).unwrap();

        let keys: Vec<String> = bus
            .operations()
            .into_iter()
            .filter(|op| op.op == "set_config")
            .map(|op| op.param)
            .collect();
        assert_eq!(
            keys,
            vec!["aperture", "shutterspeed", "iso", "capturetarget", "syncdatetimeutc"]
        );
        assert_eq!(bus.config_value("usb:001,004", "capturetarget").as_deref(), Some("1"));
        assert_eq!(bus.config_value("usb:001,004", "syncdatetimeutc").as_deref(), Some("0"));
    }

    #[test]
    fn test_partial_config_still_configures() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left").rejecting("iso"));
        let mut session = open_session(&bus, "usb:001,004");

        let report = session.apply_config(&exposure()).unwrap();
        assert_eq!(report.rejected, vec![("iso".to_string(), "400".to_string())]);
        assert!(matches!(
            report.into_result(),
            Err(PhotoError::ConfigError { ref key, .. }) if key == "iso"
        ));
        assert!(session.is_configured());
        // Later settings were still applied
        assert_eq!(bus.config_value("usb:001,004", "capturetarget").as_deref(), Some("1"));
    }

    #[test]
    fn test_primitives_require_open_session() {
        let mut session = CameraSession::new(ControlsConfig::default(), Duration::ZERO);
        assert!(matches!(session.get_config("iso"), Err(PhotoError::NotReady)));
        assert!(matches!(session.set_config("iso", "100"), Err(PhotoError::NotReady)));
        assert!(matches!(session.trigger_remote_release(), Err(PhotoError::NotReady)));
        assert!(matches!(session.apply_config(&exposure()), Err(PhotoError::NotReady)));
        assert!(session.poll_captured_event().unwrap().is_none());
    }

    #[test]
    fn test_download_refuses_existing_destination() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let mut session = open_session(&bus, "usb:001,004");
        let remote = bus.capture("usb:001,004").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.jpg");
        std::fs::write(&dest, b"keep").unwrap();

        let result = session.download_file(&remote, &dest);
        assert!(matches!(result, Err(PhotoError::IoError(_))));
        assert_eq!(std::fs::read(&dest).unwrap(), b"keep");
    }

    #[test]
    fn test_focus_runs_cancel_even_when_drive_fails() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left").rejecting("autofocusdrive"));
        let mut session = open_session(&bus, "usb:001,004");

        assert!(session.focus(Duration::from_millis(1)).is_err());
        assert_eq!(bus.set_count("usb:001,004", "cancelautofocus"), 1);
    }

    #[test]
    fn test_wait_for_settled_wakes_on_notify() {
        let shared = Arc::new(SharedSession::new(CameraSession::new(
            ControlsConfig::default(),
            Duration::ZERO,
        )));
        shared.lock().unwrap().ledger.record_trigger();

        let writer = shared.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer
                .lock()
                .unwrap()
                .ledger
                .record_picture(PicturePath::new("/DCIM", "A.JPG"));
            writer.notify_captures();
        });

        let guard = shared.wait_for_settled(Duration::from_millis(5)).unwrap();
        assert_eq!(guard.ledger.len(), 1);
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn test_released_waiters_fail_not_ready() {
        let shared = Arc::new(SharedSession::new(CameraSession::new(
            ControlsConfig::default(),
            Duration::ZERO,
        )));
        shared.lock().unwrap().ledger.record_trigger();

        let waiter = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                shared
                    .wait_for_settled(Duration::from_secs(60))
                    .map(|guard| guard.ledger.len())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        shared.release_waiters();

        assert!(matches!(waiter.join().unwrap(), Err(PhotoError::NotReady)));
        // A settled ledger still answers after release
        shared.lock().unwrap().ledger.reset();
        assert!(shared.wait_for_settled(Duration::from_millis(5)).is_ok());
    }
}
