//! In-memory camera bus
//!
//! Simulates several cameras on one USB bus: plugging and unplugging, claims
//! held by other processes, owner attributes, rejected settings and capture
//! events. Every device call is recorded, and the number of device calls in
//! flight at the same time is tracked so serialisation can be asserted.

use crate::config::ControlsConfig;
use crate::errors::PhotoError;
use crate::platform::{CameraDevice, CameraDriver, ClaimDetector, DeviceEnumerator};
use crate::types::{usb_port, DeviceCandidate, PicturePath};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const CAMERA_FOLDER: &str = "/store_00020001/DCIM/100CANON";

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOp {
    pub port: String,
    pub op: String,
    pub param: String,
}

/// A simulated camera
#[derive(Debug, Clone)]
pub struct MockCamera {
    bus: u8,
    address: u8,
    model: String,
    present: bool,
    claimed: bool,
    fail_open: bool,
    capture_on_trigger: bool,
    rejected: HashSet<String>,
    config: HashMap<String, String>,
    events: VecDeque<PicturePath>,
    storage: BTreeMap<String, Vec<u8>>,
    next_image: u32,
}

impl MockCamera {
    pub fn new(bus: u8, address: u8, owner: &str) -> Self {
        let mut config = HashMap::new();
        config.insert(ControlsConfig::default().owner_key, owner.to_string());
        Self {
            bus,
            address,
            model: "Canon EOS 5D Mark IV".to_string(),
            present: true,
            claimed: false,
            fail_open: false,
            capture_on_trigger: false,
            rejected: HashSet::new(),
            config,
            events: VecDeque::new(),
            storage: BTreeMap::new(),
            next_image: 1,
        }
    }

    /// Held by another process
    pub fn claimed(mut self) -> Self {
        self.claimed = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Refuse every write to `key`
    pub fn rejecting(mut self, key: &str) -> Self {
        self.rejected.insert(key.to_string());
        self
    }

    /// Produce a picture event whenever the shutter is released
    pub fn capturing_on_trigger(mut self) -> Self {
        self.capture_on_trigger = true;
        self
    }

    pub fn port(&self) -> String {
        usb_port(self.bus, self.address)
    }

    fn candidate(&self) -> DeviceCandidate {
        DeviceCandidate::new(self.bus, self.address, self.model.clone())
    }

    fn take_picture(&mut self) -> PicturePath {
        let path = PicturePath::new(CAMERA_FOLDER, format!("IMG_{:04}.JPG", self.next_image));
        self.next_image += 1;
        self.storage
            .insert(path.to_string(), format!("jpeg:{}", path).into_bytes());
        self.events.push_back(path.clone());
        path
    }
}

#[derive(Default)]
struct BusState {
    cameras: Vec<MockCamera>,
    operations: Vec<DeviceOp>,
    opened: Vec<String>,
    claim_probes: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
    op_delay: Duration,
}

impl BusState {
    fn camera_mut(&mut self, port: &str) -> Option<&mut MockCamera> {
        self.cameras.iter_mut().find(|c| c.port() == port)
    }
}

/// Shared handle to the simulated bus. Clones see the same cameras.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        // Test double: a panic elsewhere must not hide the bus from assertions
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attach(&self, camera: MockCamera) {
        self.state().cameras.push(camera);
    }

    pub fn unplug(&self, port: &str) {
        if let Some(camera) = self.state().camera_mut(port) {
            camera.present = false;
        }
    }

    pub fn replug(&self, port: &str) {
        if let Some(camera) = self.state().camera_mut(port) {
            camera.present = true;
        }
    }

    pub fn set_claimed(&self, port: &str, claimed: bool) {
        if let Some(camera) = self.state().camera_mut(port) {
            camera.claimed = claimed;
        }
    }

    /// Delay applied inside every device call
    pub fn set_op_delay(&self, delay: Duration) {
        self.state().op_delay = delay;
    }

    /// Simulate a shutter press on the camera body
    pub fn capture(&self, port: &str) -> Option<PicturePath> {
        self.state().camera_mut(port).map(|c| c.take_picture())
    }

    /// Queue a new-file event without storing a file
    pub fn push_event(&self, port: &str, path: PicturePath) {
        if let Some(camera) = self.state().camera_mut(port) {
            camera.events.push_back(path);
        }
    }

    /// Present cameras, as the enumerator reports them
    pub fn candidates(&self) -> Vec<DeviceCandidate> {
        self.state()
            .cameras
            .iter()
            .filter(|c| c.present)
            .map(|c| c.candidate())
            .collect()
    }

    pub fn operations(&self) -> Vec<DeviceOp> {
        self.state().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    pub fn opened_ports(&self) -> Vec<String> {
        self.state().opened.clone()
    }

    pub fn claim_probes(&self) -> Vec<String> {
        self.state().claim_probes.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    /// Number of writes to `key` on `port`
    pub fn set_count(&self, port: &str, key: &str) -> usize {
        self.state()
            .operations
            .iter()
            .filter(|op| op.port == port && op.op == "set_config" && op.param == key)
            .count()
    }

    pub fn config_value(&self, port: &str, key: &str) -> Option<String> {
        self.state()
            .camera_mut(port)
            .and_then(|c| c.config.get(key).cloned())
    }

    pub fn has_file(&self, port: &str, path: &str) -> bool {
        self.state()
            .camera_mut(port)
            .map(|c| c.storage.contains_key(path))
            .unwrap_or(false)
    }

    /// Run `f` against a present camera as one device call
    fn device_call<T>(
        &self,
        port: &str,
        op: Option<(&str, &str)>,
        f: impl FnOnce(&mut MockCamera) -> Result<T, PhotoError>,
    ) -> Result<T, PhotoError> {
        let delay = {
            let mut state = self.state();
            state.in_flight += 1;
            let in_flight = state.in_flight;
            state.max_in_flight = state.max_in_flight.max(in_flight);
            if let Some((op, param)) = op {
                state.operations.push(DeviceOp {
                    port: port.to_string(),
                    op: op.to_string(),
                    param: param.to_string(),
                });
            }
            state.op_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        state.in_flight -= 1;
        match state.camera_mut(port) {
            Some(camera) if camera.present => f(camera),
            _ => Err(PhotoError::IoError(format!("device on {} disconnected", port))),
        }
    }
}

impl DeviceEnumerator for MockBus {
    fn list_candidates(&self) -> Vec<DeviceCandidate> {
        self.candidates()
    }
}

impl ClaimDetector for MockBus {
    fn is_claimed(&self, candidate: &DeviceCandidate) -> bool {
        let mut state = self.state();
        state.claim_probes.push(candidate.port.clone());
        state
            .camera_mut(&candidate.port)
            .map(|c| c.claimed)
            .unwrap_or(false)
    }
}

impl CameraDriver for MockBus {
    fn open(&self, candidate: &DeviceCandidate) -> Result<Box<dyn CameraDevice>, PhotoError> {
        let mut state = self.state();
        state.opened.push(candidate.port.clone());
        match state.camera_mut(&candidate.port) {
            Some(camera) if camera.present && !camera.fail_open => Ok(Box::new(MockDevice {
                bus: self.clone(),
                port: candidate.port.clone(),
            })),
            _ => Err(PhotoError::open(&candidate.port, "could not open device")),
        }
    }
}

/// Open handle on a simulated camera
pub struct MockDevice {
    bus: MockBus,
    port: String,
}

impl CameraDevice for MockDevice {
    fn port(&self) -> &str {
        &self.port
    }

    fn get_config(&mut self, key: &str) -> Result<String, PhotoError> {
        self.bus
            .device_call(&self.port, Some(("get_config", key)), |camera| {
                camera
                    .config
                    .get(key)
                    .cloned()
                    .ok_or_else(|| PhotoError::config(key, "unknown setting"))
            })
    }

    fn set_config(&mut self, key: &str, value: &str) -> Result<(), PhotoError> {
        self.bus
            .device_call(&self.port, Some(("set_config", key)), |camera| {
                if camera.rejected.contains(key) {
                    return Err(PhotoError::config(key, format!("value {} rejected", value)));
                }
                camera.config.insert(key.to_string(), value.to_string());

                let controls = ControlsConfig::default();
                if camera.capture_on_trigger
                    && key == controls.release_key
                    && value == controls.trigger_value
                {
                    camera.take_picture();
                }
                Ok(())
            })
    }

    fn download_file(&mut self, remote: &PicturePath, destination: &Path) -> Result<(), PhotoError> {
        let key = remote.to_string();
        let bytes = self
            .bus
            .device_call(&self.port, Some(("download_file", key.as_str())), |camera| {
                camera
                    .storage
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| PhotoError::IoError(format!("{} not on camera", key)))
            })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    fn delete_file(&mut self, remote: &PicturePath) -> Result<(), PhotoError> {
        let key = remote.to_string();
        self.bus
            .device_call(&self.port, Some(("delete_file", key.as_str())), |camera| {
                camera
                    .storage
                    .remove(&key)
                    .map(|_| ())
                    .ok_or_else(|| PhotoError::IoError(format!("{} not on camera", key)))
            })
    }

    fn poll_event(&mut self, _wait: Duration) -> Result<Option<PicturePath>, PhotoError> {
        self.bus
            .device_call(&self.port, None, |camera| Ok(camera.events.pop_front()))
    }

    fn close(self: Box<Self>) {
        self.bus.state().operations.push(DeviceOp {
            port: self.port.clone(),
            op: "close".to_string(),
            param: String::new(),
        });
    }
}
