//! Mount Protocol Communication
//!
//! Command dispatch for mounts speaking the `#:<mnemonic><args>#` ASCII
//! dialect over a half-duplex serial link.
//!
//! Layers, bottom-up:
//! - [`Transport`]: byte link (serial by default, scripted in tests)
//! - [`SessionLock`]: cross-process exclusion per device
//! - [`CommandFormatter`] / [`ResponseCache`]: framing and short-lived answers
//! - [`CommandDispatcher`]: one exclusive session per command

pub mod cache;
pub mod commands;
pub mod dispatcher;
mod error;
pub mod formatter;
pub mod lock;
pub mod serial;
mod transport;

pub use cache::ResponseCache;
pub use commands::{CommandKind, GuideDirection, Mnemonic};
pub use dispatcher::{is_affirmative, CommandDispatcher, DeviceContext, DispatcherConfig};
pub use error::{FailureClass, ProtocolError};
pub use formatter::{CommandFormatter, COMMAND_PREFIX, TERMINATOR};
pub use lock::{SessionGuard, SessionLock};
pub use serial::{list_ports, open_port, PortInfo, SerialTransport};
pub use transport::Transport;

/// Default baud rate for the mount's serial link
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default bound for session acquisition and receives, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
