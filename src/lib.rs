//! CrabPhoto: owner-claimed DSLR node built on libgphoto2
//!
//! Several cameras can share one USB bus while each is driven by its own
//! process. A node is configured with an owner identity, finds the camera
//! whose owner attribute matches, applies its exposure settings, tracks the
//! pictures the camera reports, and reattaches by itself after unplugs.
//!
//! # Features
//! - Owner-based camera acquisition that never touches claimed devices
//! - Automatic reconnection with configuration re-applied on every attach
//! - Remote trigger, autofocus and shutter unlock
//! - Batch downloads that wait for every triggered picture
//! - Picture notifications over a broadcast channel
//! - Typed JSON command surface
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! crabphoto = { version = "0.3", features = ["gphoto"] }
//! ```
//!
//! Then start a node:
//! ```rust,ignore
//! use crabphoto::{Backend, PhotoNode, PhotoNodeConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     crabphoto::init_logging();
//!     let node = PhotoNode::start(PhotoNodeConfig::for_owner("left"), Backend::gphoto()?)?;
//!     node.wait_until_ready(std::time::Duration::from_secs(10));
//!     node.trigger()?;
//!     node.download_pictures(&["left_0001.jpg"])?;
//!     Ok(())
//! }
//! ```
pub mod acquisition;
pub mod commands;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod node;
pub mod platform;
pub mod session;
pub mod supervisor;
pub mod timing;
pub mod tracker;
pub mod types;

// Testing utilities - in-memory camera bus for offline testing
pub mod testing;

// Re-exports for convenience
pub use commands::{dispatch, handle_request, CommandRequest, CommandResponse};
pub use config::PhotoNodeConfig;
pub use errors::PhotoError;
pub use node::{DeleteReport, DownloadReport, PhotoNode};
pub use platform::Backend;
pub use types::{
    AcquisitionPhase, DeviceCandidate, ExposureSettings, NodeStatus, PictureNotification,
    PicturePath, SessionState,
};

/// Initialize logging for the photo node
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabphoto=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        gphoto: cfg!(feature = "gphoto"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Whether the libgphoto2 backend was compiled in
    pub gphoto: bool,
}
