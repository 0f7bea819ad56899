//! Serial transport
//!
//! Byte-level line I/O over a blocking serial connection. The controller
//! speaks newline-terminated ASCII, so the transport exposes exactly two
//! operations on the wire: write a line, read a line.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{ProtocolError, DEFAULT_BAUD_RATE, REBOOT_SETTLE_MS};

/// Poll interval while waiting for bytes, matching the short read timeout
/// set on the port itself.
const POLL_INTERVAL_MS: u64 = 2;

/// Line-oriented transport to the controller.
///
/// The serial implementation is [`SerialTransport`]; tests and demo mode
/// substitute scripted implementations at this seam.
pub trait LineTransport: Send {
    /// Append the line terminator and write the bytes. No acknowledgement
    /// is awaited at this layer.
    fn send_line(&mut self, text: &str) -> Result<(), ProtocolError>;

    /// Block up to the configured timeout for one line. Returns an empty
    /// string on timeout; callers treat empty as "no data yet".
    fn read_line(&mut self) -> Result<String, ProtocolError>;

    /// Wait for pending output to drain
    fn flush(&mut self) -> Result<(), ProtocolError>;

    /// Force the remote device through its startup routine. Default is a
    /// no-op for transports with nothing to reboot.
    fn reboot(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// Release the connection. Idempotent: closing twice is a no-op.
    fn close(&mut self);

    /// Check whether the connection is open
    fn is_open(&self) -> bool;
}

/// Decode raw bytes permissively: every byte maps to the corresponding
/// latin-1 character, so device noise can never fail decoding.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Blocking serial implementation of [`LineTransport`]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    /// Overall deadline for one read_line call
    read_timeout: Duration,
    /// Bytes received past the last terminator, carried to the next read
    carry: Vec<u8>,
}

impl SerialTransport {
    /// Open a serial port with 8N1 framing.
    ///
    /// Fails with [`ProtocolError::Connection`] if the device cannot be
    /// opened (bad port name, driver missing, device unplugged).
    pub fn open(
        port_name: &str,
        baud_rate: Option<u32>,
        read_timeout: Duration,
    ) -> Result<Self, ProtocolError> {
        let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

        // Short port-level timeout; read_line enforces the overall deadline
        let mut port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| {
                ProtocolError::Connection(format!("cannot open {port_name} at {baud} baud: {e}"))
            })?;

        // Standard 8N1 configuration
        port.set_data_bits(serialport::DataBits::Eight)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        port.set_parity(serialport::Parity::None)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        port.set_stop_bits(serialport::StopBits::One)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        port.set_flow_control(serialport::FlowControl::None)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

        debug!(port = port_name, baud, "serial port opened");

        Ok(Self {
            port: Some(port),
            read_timeout,
            carry: Vec::new(),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, ProtocolError> {
        self.port.as_mut().ok_or(ProtocolError::NotConnected)
    }

    /// Take one terminated line out of the carry buffer, if present
    fn take_carried_line(&mut self) -> Option<String> {
        let pos = self.carry.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.carry.drain(..=pos).collect();
        line.pop(); // the terminator itself
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(decode_latin1(&line))
    }
}

impl LineTransport for SerialTransport {
    fn send_line(&mut self, text: &str) -> Result<(), ProtocolError> {
        let port = self.port_mut()?;
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        port.write_all(&bytes)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        trace!(line = text, "sent");
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ProtocolError> {
        if let Some(line) = self.take_carried_line() {
            trace!(%line, "received (carried)");
            return Ok(line);
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut buffer = [0u8; 512];

        loop {
            let n_read = {
                let port = self.port_mut()?;
                let available = port
                    .bytes_to_read()
                    .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

                if available == 0 {
                    0
                } else {
                    let to_read = (available as usize).min(buffer.len());
                    match port.read(&mut buffer[..to_read]) {
                        Ok(n) => n,
                        Err(ref e)
                            if e.kind() == std::io::ErrorKind::TimedOut
                                || e.kind() == std::io::ErrorKind::WouldBlock =>
                        {
                            0
                        }
                        Err(e) => return Err(ProtocolError::SerialError(e.to_string())),
                    }
                }
            };

            if n_read > 0 {
                self.carry.extend_from_slice(&buffer[..n_read]);
                if let Some(line) = self.take_carried_line() {
                    trace!(%line, "received");
                    return Ok(line);
                }
            }

            if Instant::now() >= deadline {
                // Timeout is not an error: a partial line stays in the carry
                // buffer for the next call.
                return Ok(String::new());
            }
            std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        self.port_mut()?
            .flush()
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    fn reboot(&mut self) -> Result<(), ProtocolError> {
        debug!("rebooting controller via DTR toggle");
        let port = self.port_mut()?;

        // Assert, deassert, assert forces the bootloader reset
        for level in [true, false, true] {
            port.write_data_terminal_ready(level)
                .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        }

        // Give the firmware time to run its setup routine
        std::thread::sleep(Duration::from_millis(REBOOT_SETTLE_MS));
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("serial port closed");
        }
        self.carry.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
