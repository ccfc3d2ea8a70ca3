//! Device backends
//!
//! The node talks to hardware through four seams: enumerating cameras on the
//! bus, probing whether another process holds one, opening a camera, and the
//! open device itself. The `gphoto` feature provides libgphoto2 and raw USB
//! implementations; `crate::testing::MockBus` provides an in-memory one.

use crate::errors::PhotoError;
use crate::types::{DeviceCandidate, PicturePath};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "gphoto")]
pub mod gphoto;
#[cfg(feature = "gphoto")]
pub mod usb;

/// Lists cameras currently visible on the imaging bus
pub trait DeviceEnumerator: Send + Sync {
    /// Fresh enumeration on every call. Bus failures yield an empty list.
    fn list_candidates(&self) -> Vec<DeviceCandidate>;

    /// Cheap presence check for an already claimed port
    fn is_present(&self, port: &str) -> bool {
        self.list_candidates().iter().any(|c| c.port == port)
    }
}

/// Detects an exclusive interface claim held by another process
pub trait ClaimDetector: Send + Sync {
    fn is_claimed(&self, candidate: &DeviceCandidate) -> bool;
}

/// Opens a session-level handle on a candidate
pub trait CameraDriver: Send + Sync {
    fn open(&self, candidate: &DeviceCandidate) -> Result<Box<dyn CameraDevice>, PhotoError>;
}

/// An open camera handle. Every call is a device protocol exchange.
pub trait CameraDevice: Send {
    fn port(&self) -> &str;

    fn get_config(&mut self, key: &str) -> Result<String, PhotoError>;

    fn set_config(&mut self, key: &str, value: &str) -> Result<(), PhotoError>;

    fn download_file(&mut self, remote: &PicturePath, destination: &Path) -> Result<(), PhotoError>;

    fn delete_file(&mut self, remote: &PicturePath) -> Result<(), PhotoError>;

    /// Single check of the device event queue, waiting at most `wait`
    fn poll_event(&mut self, wait: Duration) -> Result<Option<PicturePath>, PhotoError>;

    fn close(self: Box<Self>) {}
}

/// The set of collaborators the node needs from a backend
#[derive(Clone)]
pub struct Backend {
    pub enumerator: Arc<dyn DeviceEnumerator>,
    pub claims: Arc<dyn ClaimDetector>,
    pub driver: Arc<dyn CameraDriver>,
}

impl Backend {
    pub fn new(
        enumerator: Arc<dyn DeviceEnumerator>,
        claims: Arc<dyn ClaimDetector>,
        driver: Arc<dyn CameraDriver>,
    ) -> Self {
        Self {
            enumerator,
            claims,
            driver,
        }
    }

    /// Use one value for all three roles
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: DeviceEnumerator + ClaimDetector + CameraDriver + 'static,
    {
        Self {
            enumerator: backend.clone(),
            claims: backend.clone(),
            driver: backend,
        }
    }

    /// libgphoto2 enumeration and sessions with a raw USB claim probe
    #[cfg(feature = "gphoto")]
    pub fn gphoto() -> Result<Self, PhotoError> {
        let driver = Arc::new(gphoto::GphotoDriver::new()?);
        Ok(Self {
            enumerator: driver.clone(),
            claims: Arc::new(usb::UsbClaimDetector),
            driver,
        })
    }
}
