use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A camera visible on the USB bus during one enumeration pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCandidate {
    pub bus: u8,
    pub address: u8,
    /// libgphoto2 port descriptor, e.g. `usb:001,004`
    pub port: String,
    pub model: String,
}

impl DeviceCandidate {
    pub fn new(bus: u8, address: u8, model: impl Into<String>) -> Self {
        Self {
            bus,
            address,
            port: usb_port(bus, address),
            model: model.into(),
        }
    }

    /// Build a candidate from a gphoto2 port descriptor. Non-USB ports yield `None`.
    pub fn from_port(port: &str, model: impl Into<String>) -> Option<Self> {
        let (bus, address) = parse_usb_port(port)?;
        Some(Self {
            bus,
            address,
            port: port.to_string(),
            model: model.into(),
        })
    }
}

/// Format a bus/address pair the way libgphoto2 names USB ports
pub fn usb_port(bus: u8, address: u8) -> String {
    format!("usb:{:03},{:03}", bus, address)
}

/// Parse `usb:BBB,DDD` into (bus, address)
pub fn parse_usb_port(port: &str) -> Option<(u8, u8)> {
    let rest = port.strip_prefix("usb:")?;
    let (bus, address) = rest.split_once(',')?;
    Some((bus.trim().parse().ok()?, address.trim().parse().ok()?))
}

/// Location of a captured image on the camera storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicturePath {
    pub folder: String,
    pub name: String,
}

impl PicturePath {
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        let folder = folder.into();
        let folder = match folder.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            folder,
            name: name.into(),
        }
    }

    /// Split a full camera path at its last separator
    pub fn parse(path: &str) -> Self {
        match path.rfind('/') {
            Some(pos) => Self::new(&path[..pos], &path[pos + 1..]),
            None => Self::new("/", path),
        }
    }
}

impl fmt::Display for PicturePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.folder == "/" {
            write!(f, "/{}", self.name)
        } else {
            write!(f, "{}/{}", self.folder, self.name)
        }
    }
}

/// Exposure applied after every acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureSettings {
    pub aperture: String,
    pub shutter_speed: String,
    pub iso: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Closed,
    Open,
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionPhase {
    #[default]
    Seeking,
    Verifying,
    Acquired,
}

/// Published once per picture discovered on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureNotification {
    pub path: String,
    /// Position in the picture list, zero based
    pub index: usize,
    pub discovered_at: DateTime<Utc>,
}

/// Snapshot of the node for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub owner: String,
    pub phase: AcquisitionPhase,
    pub connected: bool,
    pub configured: bool,
    pub port: Option<String>,
    pub session_id: Option<Uuid>,
    pub trigger_count: usize,
    pub picture_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_port_round_trip_format() {
        assert_eq!(usb_port(1, 4), "usb:001,004");
        assert_eq!(parse_usb_port("usb:002,017"), Some((2, 17)));
        assert_eq!(parse_usb_port("ptpip:192.168.1.2"), None);
        assert_eq!(parse_usb_port("usb:"), None);
        assert_eq!(parse_usb_port("usb:999,001"), None);
    }

    #[test]
    fn test_candidate_from_port() {
        let candidate = DeviceCandidate::from_port("usb:003,009", "Canon EOS 5D").unwrap();
        assert_eq!(candidate.bus, 3);
        assert_eq!(candidate.address, 9);
        assert_eq!(candidate.port, "usb:003,009");
        assert!(DeviceCandidate::from_port("serial:/dev/ttyS0", "x").is_none());
    }

    #[test]
    fn test_picture_path_parse_and_display() {
        let path = PicturePath::parse("/store_00020001/DCIM/100CANON/IMG_0001.JPG");
        assert_eq!(path.folder, "/store_00020001/DCIM/100CANON");
        assert_eq!(path.name, "IMG_0001.JPG");
        assert_eq!(path.to_string(), "/store_00020001/DCIM/100CANON/IMG_0001.JPG");

        let trailing = PicturePath::new("/DCIM/", "A.JPG");
        assert_eq!(trailing.to_string(), "/DCIM/A.JPG");

        let root = PicturePath::parse("/A.JPG");
        assert_eq!(root.folder, "/");
        assert_eq!(root.to_string(), "/A.JPG");

        let bare = PicturePath::parse("A.JPG");
        assert_eq!(bare.to_string(), "/A.JPG");
    }
}
