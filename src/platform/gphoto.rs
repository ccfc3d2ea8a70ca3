//! libgphoto2 backend
//!
//! Enumeration and sessions go through `gphoto2`; the presence check used by
//! the supervisor goes straight to the USB device list, which is far cheaper
//! than a libgphoto2 autodetect.

use super::{usb, CameraDevice, CameraDriver, DeviceEnumerator};
use crate::errors::PhotoError;
use crate::types::{parse_usb_port, DeviceCandidate, PicturePath};
use gphoto2::camera::CameraEvent;
use gphoto2::list::CameraDescriptor;
use gphoto2::widget::{RadioWidget, Widget};
use gphoto2::{Camera, Context};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Non-file events drained per poll before giving up for this tick
const MAX_EVENTS_PER_POLL: usize = 16;

pub struct GphotoDriver {
    context: Mutex<Context>,
}

impl GphotoDriver {
    pub fn new() -> Result<Self, PhotoError> {
        let context = Context::new().map_err(|e| {
            PhotoError::open("context", format!("Failed to create gphoto2 context: {}", e))
        })?;
        Ok(Self {
            context: Mutex::new(context),
        })
    }
}

impl DeviceEnumerator for GphotoDriver {
    fn list_candidates(&self) -> Vec<DeviceCandidate> {
        let context = match self.context.lock() {
            Ok(context) => context,
            Err(_) => {
                log::error!("gphoto2 context lock poisoned");
                return Vec::new();
            }
        };

        let cameras = match context.list_cameras().wait() {
            Ok(cameras) => cameras,
            Err(e) => {
                log::warn!("Autodetection of cameras failed: {}", e);
                return Vec::new();
            }
        };

        cameras
            .filter_map(|CameraDescriptor { model, port }| {
                let candidate = DeviceCandidate::from_port(&port, model);
                if candidate.is_none() {
                    log::debug!("Skipping non-USB camera port {}", port);
                }
                candidate
            })
            .collect()
    }

    fn is_present(&self, port: &str) -> bool {
        match parse_usb_port(port) {
            Some((bus, address)) => usb::device_present(bus, address),
            None => false,
        }
    }
}

impl CameraDriver for GphotoDriver {
    fn open(&self, candidate: &DeviceCandidate) -> Result<Box<dyn CameraDevice>, PhotoError> {
        let context = self.context.lock()?;
        let descriptor = CameraDescriptor {
            model: candidate.model.clone(),
            port: candidate.port.clone(),
        };
        let camera = context
            .get_camera(&descriptor)
            .wait()
            .map_err(|e| PhotoError::open(&candidate.port, e.to_string()))?;

        log::debug!("Opened {} on {}", candidate.model, candidate.port);
        Ok(Box::new(GphotoDevice {
            camera,
            port: candidate.port.clone(),
        }))
    }
}

pub struct GphotoDevice {
    camera: Camera,
    port: String,
}

impl GphotoDevice {
    fn widget(&self, key: &str) -> Result<Widget, PhotoError> {
        self.camera
            .config_key::<Widget>(key)
            .wait()
            .map_err(|e| PhotoError::config(key, e.to_string()))
    }
}

impl CameraDevice for GphotoDevice {
    fn port(&self) -> &str {
        &self.port
    }

    fn get_config(&mut self, key: &str) -> Result<String, PhotoError> {
        match self.widget(key)? {
            Widget::Text(w) => Ok(w.value()),
            Widget::Radio(w) => Ok(w.choice()),
            Widget::Range(w) => Ok(w.value().to_string()),
            Widget::Toggle(w) => Ok(match w.toggled() {
                Some(true) => "1".to_string(),
                Some(false) => "0".to_string(),
                None => String::new(),
            }),
            Widget::Date(w) => Ok(w.timestamp().to_string()),
            _ => Err(PhotoError::config(key, "widget has no readable value")),
        }
    }

    fn set_config(&mut self, key: &str, value: &str) -> Result<(), PhotoError> {
        let widget = self.widget(key)?;
        let invalid = |reason: &str| PhotoError::config(key, format!("{} ({})", reason, value));

        match &widget {
            Widget::Text(w) => w
                .set_value(value)
                .map_err(|e| PhotoError::config(key, e.to_string()))?,
            Widget::Radio(w) => set_radio(w, key, value)?,
            Widget::Range(w) => {
                let v: f32 = value.parse().map_err(|_| invalid("expected a number"))?;
                w.set_value(v);
            }
            Widget::Toggle(w) => {
                let on = parse_toggle(value).ok_or_else(|| invalid("expected a toggle value"))?;
                w.set_toggled(on);
            }
            Widget::Date(w) => {
                let ts = value.parse().map_err(|_| invalid("expected a unix timestamp"))?;
                w.set_timestamp(ts);
            }
            _ => return Err(PhotoError::config(key, "widget is not writable")),
        }

        self.camera
            .set_config(&widget)
            .wait()
            .map_err(|e| PhotoError::config(key, e.to_string()))
    }

    fn download_file(&mut self, remote: &PicturePath, destination: &Path) -> Result<(), PhotoError> {
        self.camera
            .fs()
            .download_to(&remote.folder, &remote.name, destination)
            .wait()
            .map(|_| ())
            .map_err(|e| PhotoError::IoError(format!("Failed to download {}: {}", remote, e)))
    }

    fn delete_file(&mut self, remote: &PicturePath) -> Result<(), PhotoError> {
        self.camera
            .fs()
            .delete_file(&remote.folder, &remote.name)
            .wait()
            .map_err(|e| PhotoError::IoError(format!("Failed to delete {}: {}", remote, e)))
    }

    fn poll_event(&mut self, wait: Duration) -> Result<Option<PicturePath>, PhotoError> {
        for _ in 0..MAX_EVENTS_PER_POLL {
            let event = self
                .camera
                .wait_event(wait)
                .wait()
                .map_err(|e| PhotoError::IoError(format!("Event poll failed: {}", e)))?;
            match event {
                CameraEvent::NewFile(path) => {
                    return Ok(Some(PicturePath::new(path.folder(), path.name())));
                }
                CameraEvent::Timeout => return Ok(None),
                other => log::trace!("Ignoring camera event {:?}", other),
            }
        }
        Ok(None)
    }
}

/// Radio settings accept the choice label or its index
fn set_radio(widget: &RadioWidget, key: &str, value: &str) -> Result<(), PhotoError> {
    if widget.choices_iter().any(|c| c == value) {
        return widget
            .set_choice(value)
            .map_err(|e| PhotoError::config(key, e.to_string()));
    }

    let choice = value
        .parse::<usize>()
        .ok()
        .and_then(|index| widget.choices_iter().nth(index))
        .ok_or_else(|| PhotoError::config(key, format!("no such choice: {}", value)))?;

    widget
        .set_choice(&choice)
        .map_err(|e| PhotoError::config(key, e.to_string()))
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toggle() {
        assert_eq!(parse_toggle("true"), Some(true));
        assert_eq!(parse_toggle(" 1 "), Some(true));
        assert_eq!(parse_toggle("OFF"), Some(false));
        assert_eq!(parse_toggle("maybe"), None);
    }
}
