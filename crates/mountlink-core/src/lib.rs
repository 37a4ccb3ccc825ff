//! # Mountlink Core Library
//!
//! Command dispatch for telescope mounts speaking an LX200-style ASCII
//! protocol over a shared serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serialized command dispatch with cross-process exclusion per device
//! - Short-lived caching of polled answers, invalidated by the writes that change them
//! - Sexagesimal and axis-rate conversions tolerant of firmware quirks
//! - A mount facade mapping telescope properties onto commands
//!
//! ## Example
//!
//! ```rust,ignore
//! use mountlink_core::{config::DriverSettings, mount::Mount};
//!
//! let settings = DriverSettings::load("driver.json")?;
//! let mount = Mount::connect(&settings)?;
//!
//! println!("RA: {} h", mount.right_ascension()?);
//! mount.set_tracking(true)?;
//! ```

pub mod config;
pub mod mount;
pub mod protocol;
pub mod units;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DriverSettings;
    pub use crate::mount::{AlignmentMode, Axis, DriveRate, Mount, MountError, PierSide};
    pub use crate::protocol::{
        CommandDispatcher, DeviceContext, DispatcherConfig, GuideDirection, Mnemonic,
        ProtocolError, SerialTransport, Transport,
    };
    pub use crate::units::ConversionError;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
