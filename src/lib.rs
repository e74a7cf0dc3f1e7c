//! # Infineon Protocol Library
//!
//! A Rust library for editing configuration profiles of Infineon-based
//! e-bike motor controllers and transferring them over a serial link.
//!
//! ## Features
//!
//! - Declarative parameter tables for the EB2xx, KH6xx and KT families
//! - Per-model unit conversion between amps/volts and controller bytes
//! - Text profiles (`.asv`) with automatic family detection
//! - Binary frames with XOR checksum
//! - Upload and download handshakes with progress reporting and cancellation
//!
//! ## Example
//!
//! ```no_run
//! use infineon_protocol::{Controller, Registry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::with_builtin();
//!     let mut profile = registry.load_profile("touring.asv")?;
//!     profile.set_parameter("PhaseCurrent", 35.0)?;
//!
//!     let controller = Controller::open("/dev/ttyUSB0", profile.family())?;
//!     if controller.upload(&profile, |_| true)?.is_done() {
//!         println!("Uploaded {}", profile.model_name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod coefficients;
pub mod constants;
pub mod error;
pub mod families;
pub mod mock;
pub mod profile;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod text;
pub mod types;

pub use error::{ControllerError, Result};
pub use profile::Profile;
pub use protocol::{AckPolicy, ByteLink, Controller, Outcome, Progress, Stage};
pub use registry::{Capabilities, DownloadGroup, Family, Registry};
pub use types::*;
