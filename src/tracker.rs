//! Picture event tracker
//!
//! A background thread that polls the device event queue while the camera
//! is configured. Each new file is appended to the capture ledger under the
//! session guard, waiters are woken, and a notification is broadcast.

use crate::errors::PhotoError;
use crate::session::SharedSession;
use crate::timing::StopSignal;
use crate::types::PictureNotification;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;

pub struct PictureTracker {
    shared: Arc<SharedSession>,
    active: AtomicBool,
    notifications: broadcast::Sender<PictureNotification>,
}

impl PictureTracker {
    pub fn new(
        shared: Arc<SharedSession>,
        notifications: broadcast::Sender<PictureNotification>,
    ) -> Self {
        Self {
            shared,
            active: AtomicBool::new(false),
            notifications,
        }
    }

    /// Begin polling. Called once the session is configured.
    pub fn start(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            log::debug!("Picture tracker started");
        }
    }

    /// Stop polling. The thread keeps running idle until shutdown.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            log::debug!("Picture tracker stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// One poll of the device event queue
    pub fn tick(&self) -> Result<Option<PictureNotification>, PhotoError> {
        if !self.is_active() {
            return Ok(None);
        }

        let mut guard = self.shared.lock()?;
        let Some(path) = guard.session.poll_captured_event()? else {
            return Ok(None);
        };
        let index = guard.ledger.record_picture(path.clone());
        self.shared.notify_captures();
        drop(guard);

        log::info!("Adding picture path to list: {}", path);
        let notification = PictureNotification {
            path: path.to_string(),
            index,
            discovered_at: Utc::now(),
        };
        // No subscribers is not an error
        let _ = self.notifications.send(notification.clone());
        Ok(Some(notification))
    }

    pub fn spawn(
        self: &Arc<Self>,
        interval: Duration,
        stop: StopSignal,
    ) -> std::io::Result<JoinHandle<()>> {
        let tracker = Arc::clone(self);
        std::thread::Builder::new()
            .name("crabphoto-tracker".to_string())
            .spawn(move || tracker.run(interval, stop))
    }

    fn run(&self, interval: Duration, stop: StopSignal) {
        loop {
            if let Err(e) = self.tick() {
                // Disconnects are the supervisor's to handle
                log::debug!("Event poll failed: {}", e);
            }
            if stop.sleep(interval) {
                break;
            }
        }
        log::debug!("Picture tracker thread exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlsConfig;
    use crate::session::CameraSession;
    use crate::testing::{MockBus, MockCamera};
    use crate::types::PicturePath;

    fn tracker_for(bus: &MockBus) -> (Arc<PictureTracker>, Arc<SharedSession>) {
        let candidate = bus.candidates().remove(0);
        let mut session = CameraSession::new(ControlsConfig::default(), Duration::ZERO);
        session.open(bus, &candidate).unwrap();
        let shared = Arc::new(SharedSession::new(session));
        let (tx, _) = broadcast::channel(16);
        (Arc::new(PictureTracker::new(shared.clone(), tx)), shared)
    }

    #[test]
    fn test_inactive_tracker_does_not_poll() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let (tracker, shared) = tracker_for(&bus);
        bus.capture("usb:001,004");

        assert!(tracker.tick().unwrap().is_none());
        assert!(shared.lock().unwrap().ledger.is_empty());
    }

    #[test]
    fn test_tick_appends_in_observation_order() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let (tracker, shared) = tracker_for(&bus);
        let mut rx = tracker.notifications.subscribe();
        tracker.start();

        bus.push_event("usb:001,004", PicturePath::new("/DCIM", "B.JPG"));
        bus.push_event("usb:001,004", PicturePath::new("/DCIM", "A.JPG"));

        let first = tracker.tick().unwrap().unwrap();
        let second = tracker.tick().unwrap().unwrap();
        assert!(tracker.tick().unwrap().is_none());

        assert_eq!((first.index, second.index), (0, 1));
        assert_eq!(
            shared.lock().unwrap().ledger.paths(),
            vec!["/DCIM/B.JPG", "/DCIM/A.JPG"]
        );
        assert_eq!(rx.try_recv().unwrap().path, "/DCIM/B.JPG");
        assert_eq!(rx.try_recv().unwrap().path, "/DCIM/A.JPG");
    }

    #[test]
    fn test_poll_error_is_reported_not_recorded() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let (tracker, shared) = tracker_for(&bus);
        tracker.start();

        bus.unplug("usb:001,004");
        assert!(tracker.tick().is_err());
        assert!(shared.lock().unwrap().ledger.is_empty());
    }

    #[test]
    fn test_spawned_thread_exits_on_stop() {
        let bus = MockBus::new();
        bus.attach(MockCamera::new(1, 4, "left"));
        let (tracker, shared) = tracker_for(&bus);
        tracker.start();

        let stop = StopSignal::new();
        let handle = tracker.spawn(Duration::from_millis(1), stop.clone()).unwrap();
        bus.capture("usb:001,004");

        for _ in 0..500 {
            if shared.lock().unwrap().ledger.len() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(shared.lock().unwrap().ledger.len(), 1);

        stop.stop();
        handle.join().unwrap();
    }
}
