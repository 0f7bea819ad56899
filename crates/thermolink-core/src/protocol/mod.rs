//! Serial protocol communication
//!
//! Implements the controller's ASCII line protocol: newline-terminated,
//! tab-separated fields, values carried as 8-hex-digit big-endian IEEE-754
//! single-precision floats.

pub mod client;
pub mod commands;
mod error;
pub mod frame;
pub mod hex;
pub mod serial;

pub use client::{Client, ClientConfig, ClientState};
pub use commands::{Command, Mode, PidParameters};
pub use error::ProtocolError;
pub use frame::RowAssembler;
pub use serial::{LineTransport, SerialTransport};

/// Default baud rate for controller communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Settle time after the DTR reboot toggle, giving the firmware time to run
/// its setup routine
pub const REBOOT_SETTLE_MS: u64 = 1000;

/// Handshake attempts before the connection is abandoned
pub const HANDSHAKE_ATTEMPTS: u32 = 10;

/// Start-synchronization attempts before `start()` fails
pub const SYNC_ATTEMPTS: u32 = 5;

/// Line marking a synchronized link at the start of acquisition
pub const SYNC_MARKER: &str = "INDEX\t0\t1";

/// Default upper bound on the temperature setpoint (C)
pub const DEFAULT_TEMPERATURE_LIMIT: f64 = 85.0;

/// Bit depth of the controller's DAC
pub const DAC_BIT_DEPTH: u32 = 12;

/// Full-scale output voltage of the DAC
pub const DAC_FULL_SCALE_VOLTS: f64 = 5.0;
