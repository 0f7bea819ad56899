//! Protocol errors

use thiserror::Error;

/// Errors that can occur during controller communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Low-level serial port failure
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The port could not be opened
    #[error("Cannot open connection: {0}")]
    Connection(String),

    /// The device never echoed the handshake
    #[error("Handshake failed after {attempts} attempts")]
    Handshake {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// The synchronization marker never appeared after `START`
    #[error("Unable to synchronize data acquisition after {attempts} attempts")]
    Startup {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// An operation that needs an open connection was called without one
    #[error("Not connected to controller")]
    NotConnected,

    /// A hex-float token failed to decode
    #[error("Malformed hex value: {0:?}")]
    Decode(String),

    /// A reply line did not match the shape the command expects
    #[error("Cannot parse reply {reply:?} for command {command}")]
    Parse {
        /// The wire string that was sent
        command: String,
        /// The reply that failed to parse
        reply: String,
    },

    /// The device went silent past the tolerated empty-read window
    #[error("Connection timeout")]
    Timeout,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
