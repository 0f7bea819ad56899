//! # ThermoLink Core Library
//!
//! Driver for an Arduino-based PID temperature controller, spoken to over a
//! point-to-point serial link.
//!
//! This library provides:
//! - Line-oriented serial transport with a DTR reboot sequence
//! - The controller's handshake and init-variable ingestion
//! - Named get/set commands for temperature, setpoint, PID parameters,
//!   operating mode, and actuator output
//! - A background acquisition loop decoding the streamed data blocks into
//!   an in-memory, append-only sample log
//! - A demo mode that simulates the instrument for UI testing
//!
//! Presentation, persistence, and port enumeration are external
//! collaborators: they drive [`protocol::Client`] and read snapshots from
//! its log, but nothing here draws widgets or writes files.
//!
//! ## Example
//!
//! ```rust,ignore
//! use thermolink_core::protocol::{Client, ClientConfig};
//!
//! let mut client = Client::open(ClientConfig {
//!     port_name: "/dev/ttyACM0".to_string(),
//!     ..ClientConfig::default()
//! })?;
//!
//! client.start()?;
//! // ... later, from the UI poll loop:
//! if let Some(row) = client.latest_sample() {
//!     println!("latest block: {:?}", row.values);
//! }
//! client.stop()?;
//! ```

#![warn(missing_docs)]

pub mod datalog;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::datalog::{InitVariable, SampleLog, SampleRow, SetRecord};
    pub use crate::demo::DemoDevice;
    pub use crate::protocol::{
        Client, ClientConfig, ClientState, Mode, PidParameters, ProtocolError, SerialTransport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
