//! Configuration management for CrabPhoto
//!
//! Provides loading, saving and validation of the node settings: which camera
//! this process owns, the exposure it applies after every acquisition, the
//! device control names, and the loop timings.

use crate::errors::PhotoError;
use crate::types::ExposureSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoNodeConfig {
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub timing: TimingConfig,
}

/// Owner identity and exposure applied on every (re)acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Value of the device owner attribute this process is responsible for
    pub owner: String,
    pub shutter_speed_mode: String,
    pub aperture_mode: String,
    pub iso_mode: String,
}

/// Device control names and the values written to them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub owner_key: String,
    pub aperture_key: String,
    pub shutter_speed_key: String,
    pub iso_key: String,
    pub capture_target_key: String,
    /// Internal storage (memory card)
    pub capture_target_value: String,
    pub clock_sync_key: String,
    pub clock_sync_value: String,
    pub release_key: String,
    pub trigger_value: String,
    pub unlock_value: String,
    pub autofocus_key: String,
    pub cancel_autofocus_key: String,
}

/// Loop periods and delays, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tracker_interval_ms: u64,
    pub presence_check_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    /// Lens motor settle time between autofocus drive and cancel
    pub focus_settle_ms: u64,
    pub download_status_interval_ms: u64,
    /// How long a single event poll may wait on the device queue
    pub event_wait_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            shutter_speed_mode: "1/100".to_string(),
            aperture_mode: "8".to_string(),
            iso_mode: "400".to_string(),
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            owner_key: "ownername".to_string(),
            aperture_key: "aperture".to_string(),
            shutter_speed_key: "shutterspeed".to_string(),
            iso_key: "iso".to_string(),
            capture_target_key: "capturetarget".to_string(),
            capture_target_value: "1".to_string(),
            clock_sync_key: "syncdatetimeutc".to_string(),
            clock_sync_value: "0".to_string(),
            release_key: "eosremoterelease".to_string(),
            trigger_value: "5".to_string(),
            unlock_value: "11".to_string(),
            autofocus_key: "autofocusdrive".to_string(),
            cancel_autofocus_key: "cancelautofocus".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tracker_interval_ms: 10,
            presence_check_interval_ms: 100,
            reconnect_backoff_ms: 2000,
            focus_settle_ms: 1500,
            download_status_interval_ms: 500,
            event_wait_ms: 1,
        }
    }
}

impl TimingConfig {
    pub fn tracker_interval(&self) -> Duration {
        Duration::from_millis(self.tracker_interval_ms)
    }

    pub fn presence_check_interval(&self) -> Duration {
        Duration::from_millis(self.presence_check_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn focus_settle(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }

    pub fn download_status_interval(&self) -> Duration {
        Duration::from_millis(self.download_status_interval_ms)
    }

    pub fn event_wait(&self) -> Duration {
        Duration::from_millis(self.event_wait_ms)
    }
}

impl PhotoNodeConfig {
    /// Configuration for the given owner with default everything else
    pub fn for_owner(owner: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.camera.owner = owner.into();
        config
    }

    pub fn exposure(&self) -> ExposureSettings {
        ExposureSettings {
            aperture: self.camera.aperture_mode.clone(),
            shutter_speed: self.camera.shutter_speed_mode.clone(),
            iso: self.camera.iso_mode.clone(),
        }
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PhotoError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            PhotoError::InvalidSettings(format!("Failed to read config file: {}", e))
        })?;

        let config: PhotoNodeConfig = toml::from_str(&contents).map_err(|e| {
            PhotoError::InvalidSettings(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PhotoError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PhotoError::InvalidSettings(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            PhotoError::InvalidSettings(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            PhotoError::InvalidSettings(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("crabphoto.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), PhotoError> {
        if self.camera.owner.is_empty() {
            return Err(PhotoError::InvalidSettings(
                "camera.owner must not be empty".to_string(),
            ));
        }
        let exposure = [
            ("camera.aperture_mode", &self.camera.aperture_mode),
            ("camera.shutter_speed_mode", &self.camera.shutter_speed_mode),
            ("camera.iso_mode", &self.camera.iso_mode),
        ];
        for (name, value) in exposure {
            if value.is_empty() {
                return Err(PhotoError::InvalidSettings(format!("{} must not be empty", name)));
            }
        }
        if self.controls.owner_key.is_empty() || self.controls.release_key.is_empty() {
            return Err(PhotoError::InvalidSettings(
                "controls.owner_key and controls.release_key are required".to_string(),
            ));
        }

        let t = &self.timing;
        let periods = [
            ("timing.tracker_interval_ms", t.tracker_interval_ms),
            ("timing.presence_check_interval_ms", t.presence_check_interval_ms),
            ("timing.reconnect_backoff_ms", t.reconnect_backoff_ms),
            ("timing.download_status_interval_ms", t.download_status_interval_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(PhotoError::InvalidSettings(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PhotoNodeConfig::default();
        assert_eq!(config.controls.owner_key, "ownername");
        assert_eq!(config.controls.trigger_value, "5");
        assert_eq!(config.timing.focus_settle_ms, 1500);
        assert!(config.camera.owner.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(PhotoNodeConfig::default().validate().is_err());

        let config = PhotoNodeConfig::for_owner("left");
        assert!(config.validate().is_ok());

        let mut bad_timing = config.clone();
        bad_timing.timing.tracker_interval_ms = 0;
        assert!(bad_timing.validate().is_err());

        let mut bad_exposure = config;
        bad_exposure.camera.iso_mode.clear();
        assert!(bad_exposure.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("crabphoto.toml");

        let mut config = PhotoNodeConfig::for_owner("bench-left");
        config.camera.iso_mode = "800".to_string();
        config.save_to_file(&config_path).unwrap();

        let loaded = PhotoNodeConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.camera.owner, "bench-left");
        assert_eq!(loaded.camera.iso_mode, "800");
        assert_eq!(loaded.timing.reconnect_backoff_ms, 2000);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let text = r#"
            [camera]
            owner = "right"
            iso_mode = "100"
        "#;
        let config: PhotoNodeConfig = toml::from_str(text).unwrap();
        assert_eq!(config.camera.owner, "right");
        assert_eq!(config.camera.iso_mode, "100");
        assert_eq!(config.camera.aperture_mode, "8");
        assert_eq!(config.controls.release_key, "eosremoterelease");
        assert_eq!(config.timing.tracker_interval_ms, 10);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = PhotoNodeConfig::load_from_file("nonexistent_crabphoto.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().timing.presence_check_interval_ms, 100);
    }

    #[test]
    fn test_exposure_settings_follow_camera_section() {
        let mut config = PhotoNodeConfig::for_owner("x");
        config.camera.aperture_mode = "5.6".to_string();
        let exposure = config.exposure();
        assert_eq!(exposure.aperture, "5.6");
        assert_eq!(exposure.shutter_speed, "1/100");
    }
}
