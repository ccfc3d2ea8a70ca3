//! Testing utilities for CrabPhoto
//!
//! Provides an in-memory camera bus so acquisition, reconnection and the
//! command surface can be exercised without hardware.

pub mod mock_bus;

pub use mock_bus::{DeviceOp, MockBus, MockCamera, MockDevice};
