//! The photo node
//!
//! `PhotoNode` owns the session guard, the capture ledger, the supervisor and
//! tracker threads, and exposes the blocking command surface. Every device
//! touch from a command goes through the same guard as the tracker polls.

use crate::acquisition::{Acquirer, PhaseCell};
use crate::config::PhotoNodeConfig;
use crate::errors::PhotoError;
use crate::platform::Backend;
use crate::session::{CameraSession, DeviceState, SharedSession};
use crate::supervisor::Supervisor;
use crate::timing::StopSignal;
use crate::tracker::PictureTracker;
use crate::types::{NodeStatus, PictureNotification, PicturePath};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const NOTIFICATION_CAPACITY: usize = 256;
const READY_POLL: Duration = Duration::from_millis(10);

/// Outcome of a download batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: Vec<PathBuf>,
    /// Destinations that already existed and were left untouched
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl DownloadReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of a delete batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct PhotoNode {
    config: PhotoNodeConfig,
    shared: Arc<SharedSession>,
    tracker: Arc<PictureTracker>,
    phase: PhaseCell,
    notifications: broadcast::Sender<PictureNotification>,
    stop: StopSignal,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl PhotoNode {
    /// Validate the configuration and start the supervisor and tracker threads
    pub fn start(config: PhotoNodeConfig, backend: Backend) -> Result<Self, PhotoError> {
        config.validate()?;
        log::info!("Starting photo node for owner {}", config.camera.owner);

        let event_wait = config.timing.event_wait();
        let shared = Arc::new(SharedSession::new(CameraSession::new(
            config.controls.clone(),
            event_wait,
        )));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let tracker = Arc::new(PictureTracker::new(shared.clone(), notifications.clone()));
        let phase = PhaseCell::default();
        let stop = StopSignal::new();

        let acquirer = Acquirer::new(
            backend.clone(),
            config.controls.clone(),
            event_wait,
            phase.clone(),
        );
        let supervisor = Supervisor::new(
            config.camera.owner.clone(),
            config.exposure(),
            acquirer,
            backend.enumerator.clone(),
            shared.clone(),
            tracker.clone(),
            phase.clone(),
            config.timing.clone(),
        );

        let tracker_thread = tracker.spawn(config.timing.tracker_interval(), stop.clone())?;
        let supervisor_thread = match supervisor.spawn(stop.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                stop.stop();
                let _ = tracker_thread.join();
                return Err(e.into());
            }
        };

        Ok(Self {
            config,
            shared,
            tracker,
            phase,
            notifications,
            stop,
            threads: Mutex::new(vec![supervisor_thread, tracker_thread]),
        })
    }

    pub fn config(&self) -> &PhotoNodeConfig {
        &self.config
    }

    pub fn owner(&self) -> &str {
        &self.config.camera.owner
    }

    fn lock(&self) -> Result<MutexGuard<'_, DeviceState>, PhotoError> {
        self.shared.lock()
    }

    fn lock_ready(&self) -> Result<MutexGuard<'_, DeviceState>, PhotoError> {
        let guard = self.lock()?;
        if !guard.session.is_configured() {
            return Err(PhotoError::NotReady);
        }
        Ok(guard)
    }

    pub fn set_config(&self, param: &str, value: &str) -> Result<(), PhotoError> {
        log::info!("Setting {} to {}", param, value);
        self.lock()?.session.set_config(param, value)
    }

    pub fn get_config(&self, param: &str) -> Result<String, PhotoError> {
        self.lock()?.session.get_config(param)
    }

    /// Fire the shutter. The picture shows up later through the tracker.
    ///
    /// The request is counted even when the release write reports an error,
    /// since the body may have fired anyway.
    pub fn trigger(&self) -> Result<(), PhotoError> {
        let mut guard = self.lock_ready()?;
        guard.ledger.record_trigger();
        let count = guard.ledger.trigger_count();
        match guard.session.trigger_remote_release() {
            Ok(()) => {
                log::info!("Triggered camera {} (trigger count: {})", self.owner(), count);
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "Trigger on camera {} reported {} (trigger count: {})",
                    self.owner(),
                    e,
                    count
                );
                Err(e)
            }
        }
    }

    /// Autofocus cycle. Holds the guard for the whole settle time.
    pub fn set_focus(&self) -> Result<(), PhotoError> {
        let mut guard = self.lock_ready()?;
        log::info!("Focusing camera {}", self.owner());
        guard.session.focus(self.config.timing.focus_settle())
    }

    pub fn unlock_camera(&self) -> Result<(), PhotoError> {
        log::info!("Unlocking camera {}", self.owner());
        self.lock()?.session.unlock()
    }

    /// Wait until every trigger has a picture, then copy picture `i` to
    /// `destinations[i]`. A length mismatch fails before any transfer.
    pub fn download_pictures<P: AsRef<Path>>(
        &self,
        destinations: &[P],
    ) -> Result<DownloadReport, PhotoError> {
        let started = Instant::now();
        let pictures = {
            let guard = self
                .shared
                .wait_for_settled(self.config.timing.download_status_interval())?;
            guard.ledger.pictures().to_vec()
        };
        let waited = started.elapsed();

        if destinations.len() != pictures.len() {
            log::error!(
                "Download batch of {} destinations does not match {} pictures",
                destinations.len(),
                pictures.len()
            );
            return Err(PhotoError::BatchMismatch {
                expected: pictures.len(),
                requested: destinations.len(),
            });
        }

        let mut report = DownloadReport::default();
        for (remote, destination) in pictures.iter().zip(destinations) {
            let destination = destination.as_ref();
            if destination.exists() {
                log::warn!("{} already exists, skipping download", destination.display());
                report.skipped.push(destination.to_path_buf());
                continue;
            }

            let result = self
                .lock()
                .and_then(|mut guard| guard.session.download_file(remote, destination));
            match result {
                Ok(()) => {
                    log::debug!("Downloaded {} to {}", remote, destination.display());
                    report.downloaded.push(destination.to_path_buf());
                }
                Err(e) => {
                    log::error!("Failed to download {}: {}", remote, e);
                    report.failed.push((destination.to_path_buf(), e.to_string()));
                }
            }
        }

        let total = started.elapsed();
        let transfer = total.saturating_sub(waited);
        let per_file = if report.downloaded.is_empty() {
            Duration::ZERO
        } else {
            transfer / report.downloaded.len() as u32
        };
        log::info!(
            "Downloaded {} picture(s) in {:.3}s (waited {:.3}s, {:.3}s per picture, {} skipped, {} failed)",
            report.downloaded.len(),
            total.as_secs_f64(),
            waited.as_secs_f64(),
            per_file.as_secs_f64(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    pub fn get_picture_path_list(&self) -> Result<Vec<String>, PhotoError> {
        Ok(self.lock()?.ledger.paths())
    }

    pub fn reset_picture_path_list(&self) -> Result<(), PhotoError> {
        self.lock()?.ledger.reset();
        log::info!("Picture path list reset");
        Ok(())
    }

    /// Delete pictures from the camera storage. Per-file failures are logged
    /// and reported, they do not fail the call.
    pub fn delete_pictures<S: AsRef<str>>(&self, paths: &[S]) -> Result<DeleteReport, PhotoError> {
        if !self.lock()?.session.is_connected() {
            return Err(PhotoError::NotReady);
        }

        let mut report = DeleteReport::default();
        for path in paths {
            let path = path.as_ref();
            let remote = PicturePath::parse(path);
            let result = self
                .lock()
                .and_then(|mut guard| guard.session.delete_file(&remote));
            match result {
                Ok(()) => report.deleted.push(path.to_string()),
                Err(e) => {
                    log::error!("Failed to delete {}: {}", path, e);
                    report.failed.push((path.to_string(), e.to_string()));
                }
            }
        }
        log::info!(
            "Deleted {} picture(s), {} failed",
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Connected and configured. Reads the published flags, never the guard.
    pub fn is_camera_ready(&self) -> bool {
        self.phase.is_ready()
    }

    /// Block until the camera is ready or `timeout` passes
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_camera_ready() {
                return true;
            }
            if Instant::now() >= deadline || self.stop.is_stopped() {
                return false;
            }
            std::thread::sleep(READY_POLL);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PictureNotification> {
        self.notifications.subscribe()
    }

    pub fn status(&self) -> Result<NodeStatus, PhotoError> {
        let guard = self.lock()?;
        Ok(NodeStatus {
            owner: self.owner().to_string(),
            phase: self.phase.get(),
            connected: guard.session.is_connected(),
            configured: guard.session.is_configured(),
            port: guard.session.port().map(str::to_string),
            session_id: guard.session.session_id(),
            trigger_count: guard.ledger.trigger_count(),
            picture_count: guard.ledger.len(),
        })
    }

    /// Stop both threads and release the camera. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.stop.stop();
        self.tracker.stop();
        self.shared.release_waiters();

        let handles: Vec<JoinHandle<()>> = match self.threads.lock() {
            Ok(mut threads) => threads.drain(..).collect(),
            Err(e) => e.into_inner().drain(..).collect(),
        };
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                log::error!("A photo node thread panicked");
            }
        }

        if let Ok(mut guard) = self.lock() {
            guard.session.close();
        }
        self.phase.publish_session(false, false);
        log::info!("Photo node for owner {} shut down", self.owner());
    }
}

impl Drop for PhotoNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBus, MockCamera};

    fn fast_config(owner: &str) -> PhotoNodeConfig {
        let mut config = PhotoNodeConfig::for_owner(owner);
        config.timing.tracker_interval_ms = 1;
        config.timing.presence_check_interval_ms = 2;
        config.timing.reconnect_backoff_ms = 5;
        config.timing.focus_settle_ms = 1;
        config.timing.download_status_interval_ms = 20;
        config
    }

    fn start(bus: &MockBus, owner: &str) -> PhotoNode {
        PhotoNode::start(fast_config(owner), Backend::from_shared(Arc::new(bus.clone()))).unwrap()
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let bus = MockBus::new();
        let result = PhotoNode::start(
            PhotoNodeConfig::default(),
            Backend::from_shared(Arc::new(bus)),
        );
        assert!(matches!(result, Err(PhotoError::InvalidSettings(_))));
    }

    #[test]
    fn test_commands_before_acquisition_are_not_ready() {
        let bus = MockBus::new();
        let node = start(&bus, "left");

        assert!(!node.is_camera_ready());
        assert!(matches!(node.trigger(), Err(PhotoError::NotReady)));
        assert!(matches!(node.set_focus(), Err(PhotoError::NotReady)));
        assert!(matches!(node.get_config("iso"), Err(PhotoError::NotReady)));
        assert!(matches!(node.delete_pictures(&["/a/b.jpg"]), Err(PhotoError::NotReady)));
        assert_eq!(node.get_picture_path_list().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_failed_trigger_is_still_counted() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left").rejecting("eosremoterelease"));
        let node = start(&bus, "left");
        assert!(node.wait_until_ready(Duration::from_secs(5)));

        assert!(matches!(node.trigger(), Err(PhotoError::ConfigError { .. })));
        assert_eq!(node.status().unwrap().trigger_count, 1);

        // The picture that did arrive still pairs with that request
        bus.push_event("usb:001,004", PicturePath::new("/DCIM", "IMG_0001.JPG"));
        let dir = tempfile::tempdir().unwrap();
        let result = node.download_pictures(&[dir.path().join("a.jpg")]);
        assert_eq!(result.unwrap().failed.len(), 1);
    }

    #[test]
    fn test_readiness_does_not_wait_for_the_device_guard() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let mut config = fast_config("left");
        config.timing.focus_settle_ms = 400;
        let node = Arc::new(
            PhotoNode::start(config, Backend::from_shared(Arc::new(bus.clone()))).unwrap(),
        );
        assert!(node.wait_until_ready(Duration::from_secs(5)));

        let focus = {
            let node = node.clone();
            std::thread::spawn(move || node.set_focus())
        };
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        assert!(node.is_camera_ready());
        assert!(started.elapsed() < Duration::from_millis(100));
        focus.join().unwrap().unwrap();
    }

    #[test]
    fn test_status_reflects_acquired_camera() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let node = start(&bus, "left");
        assert!(node.wait_until_ready(Duration::from_secs(5)));

        let status = node.status().unwrap();
        assert_eq!(status.owner, "left");
        assert!(status.connected && status.configured);
        assert_eq!(status.port.as_deref(), Some("usb:001,004"));
        assert!(status.session_id.is_some());
    }

    #[test]
    fn test_shutdown_releases_a_blocked_download() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let node = Arc::new(start(&bus, "left"));
        assert!(node.wait_until_ready(Duration::from_secs(5)));
        node.trigger().unwrap();

        let downloader = {
            let node = node.clone();
            std::thread::spawn(move || node.download_pictures(&["/tmp/never-arrives.jpg"]))
        };
        std::thread::sleep(Duration::from_millis(40));
        assert!(!downloader.is_finished());

        node.shutdown();
        assert!(matches!(downloader.join().unwrap(), Err(PhotoError::NotReady)));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_releases_camera() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let node = start(&bus, "left");
        assert!(node.wait_until_ready(Duration::from_secs(5)));

        node.shutdown();
        node.shutdown();
        assert!(!node.is_camera_ready());
        assert!(!node.wait_until_ready(Duration::from_millis(50)));
        assert!(bus
            .operations()
            .iter()
            .any(|op| op.port == "usb:001,004" && op.op == "close"));
    }
}
