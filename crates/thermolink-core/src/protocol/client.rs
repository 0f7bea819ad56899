//! Controller client
//!
//! Implements the controller's line protocol and the acquisition state
//! machine on top of a [`LineTransport`]:
//!
//! ```text
//! CLOSED -> CONNECTING -> HANDSHAKING -> INIT_LOADING -> IDLE <-> ACQUIRING -> CLOSED
//! ```
//!
//! The client owns exactly one background acquisition thread, started at
//! connect time and parked on a condvar gate whenever acquisition is
//! stopped. The caller side (getters, setters, start/stop) always runs on
//! the foreground thread.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::frame::{parse_label_line, LabelLine, RowAssembler};
use super::hex::decode_hex_float;
use super::serial::{LineTransport, SerialTransport};
use super::{
    Command, Mode, PidParameters, ProtocolError, DAC_BIT_DEPTH, DAC_FULL_SCALE_VOLTS,
    DEFAULT_BAUD_RATE, DEFAULT_TEMPERATURE_LIMIT, DEFAULT_TIMEOUT_MS, HANDSHAKE_ATTEMPTS,
    SYNC_ATTEMPTS, SYNC_MARKER,
};
use crate::datalog::{
    lock_unpoisoned, InitVariable, RunGate, SampleLog, SampleRow, SetRecord, SET_TIME_INDEX_NONE,
};

/// Consecutive empty reads tolerated inside the init dump and label
/// discovery before the link is declared dead. A silent device would
/// otherwise spin these loops forever.
const EMPTY_READ_LIMIT: u32 = 10;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    /// No transport
    Closed,
    /// Transport open, device rebooting
    Connecting,
    /// Handshake in progress
    Handshaking,
    /// Reading the init-variable dump
    InitLoading,
    /// Connected, acquisition parked
    Idle,
    /// Background thread collecting data
    Acquiring,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
    /// Default upper bound on the temperature setpoint (C)
    pub temperature_limit: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            temperature_limit: DEFAULT_TEMPERATURE_LIMIT,
        }
    }
}

/// Convert a requested output voltage to the nearest DAC code
fn dac_code(volts: f64) -> u32 {
    let max = (1u32 << DAC_BIT_DEPTH) - 1;
    let code = (f64::from(max) * volts / DAC_FULL_SCALE_VOLTS).round();
    code.clamp(0.0, f64::from(max)) as u32
}

/// Protocol client for the temperature controller
pub struct Client<T: LineTransport + 'static> {
    transport: Arc<Mutex<T>>,
    state: ClientState,
    config: ClientConfig,
    init_vars: Vec<InitVariable>,
    log: Arc<SampleLog>,
    gate: Arc<RunGate>,
    set_records: Vec<SetRecord>,
    reader: Option<JoinHandle<()>>,
}

impl<T: LineTransport + 'static> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("port", &self.config.port_name)
            .field("init_vars", &self.init_vars.len())
            .field("samples", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl Client<SerialTransport> {
    /// Open the configured serial port and connect to the controller
    pub fn open(config: ClientConfig) -> Result<Self, ProtocolError> {
        let transport = SerialTransport::open(
            &config.port_name,
            Some(config.baud_rate),
            Duration::from_millis(config.timeout_ms),
        )?;
        Self::connect(transport, config)
    }
}

impl<T: LineTransport + 'static> Client<T> {
    /// Connect over an already-open transport: reboot the device, run the
    /// handshake, ingest the init-variable dump, and start the (parked)
    /// acquisition thread.
    ///
    /// On handshake failure the transport is closed before the error is
    /// returned; the instance is never constructed.
    pub fn connect(mut transport: T, config: ClientConfig) -> Result<Self, ProtocolError> {
        info!(port = %config.port_name, baud = config.baud_rate, "connecting");

        // CONNECTING: force the device through its startup routine before
        // any protocol I/O.
        transport.reboot()?;

        let transport = Arc::new(Mutex::new(transport));

        // HANDSHAKING
        if let Err(e) = Self::handshake(&transport) {
            lock_unpoisoned(&transport).close();
            return Err(e);
        }

        // INIT_LOADING: the dump follows the handshake echo immediately
        let init_vars = Self::load_init_variables(&transport)?;

        let log = Arc::new(SampleLog::new());
        let gate = Arc::new(RunGate::new());
        let reader = Self::spawn_reader(
            Arc::clone(&transport),
            Arc::clone(&log),
            Arc::clone(&gate),
        )?;

        info!(init_vars = init_vars.len(), "connected");

        Ok(Self {
            transport,
            state: ClientState::Idle,
            config,
            init_vars,
            log,
            gate,
            set_records: Vec::new(),
            reader: Some(reader),
        })
    }

    fn transport(&self) -> MutexGuard<'_, T> {
        lock_unpoisoned(&self.transport)
    }

    /// Send `HANDSHAKE` until the device echoes it back, up to the attempt
    /// cap. Tab characters in the reply are stripped before comparison.
    fn handshake(transport: &Mutex<T>) -> Result<(), ProtocolError> {
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            let mut t = lock_unpoisoned(transport);
            if let Err(e) = t.send_line(&Command::Handshake.wire()) {
                debug!(attempt, %e, "handshake send failed");
                continue;
            }
            match t.read_line() {
                Ok(reply) => {
                    let reply = reply.replace('\t', "");
                    if reply == "HANDSHAKE" {
                        info!(attempt, "handshake complete");
                        return Ok(());
                    }
                    debug!(attempt, %reply, "unexpected handshake reply");
                }
                Err(e) => debug!(attempt, %e, "no handshake response"),
            }
        }
        Err(ProtocolError::Handshake {
            attempts: HANDSHAKE_ATTEMPTS,
        })
    }

    /// Read the init-variable dump: one line per variable, terminated by a
    /// literal `READY` line.
    ///
    /// Each line is tab-split with `=` and empty tokens dropped; a line
    /// reducing to `(name, hexValue, unit)` becomes an [`InitVariable`].
    /// The firmware's banner row and other junk reduce to a different token
    /// count and are skipped. A value that fails hex decoding is reported
    /// and left unset rather than failing the batch.
    fn load_init_variables(transport: &Mutex<T>) -> Result<Vec<InitVariable>, ProtocolError> {
        let mut vars = Vec::new();
        let mut empty_reads = 0u32;

        loop {
            let line = lock_unpoisoned(transport).read_line()?;
            if line == "READY" {
                break;
            }
            if line.is_empty() {
                empty_reads += 1;
                if empty_reads >= EMPTY_READ_LIMIT {
                    return Err(ProtocolError::Timeout);
                }
                continue;
            }
            empty_reads = 0;

            let tokens: Vec<&str> = line
                .split('\t')
                .filter(|t| !t.is_empty() && *t != "=")
                .collect();
            if tokens.len() != 3 {
                debug!(%line, "skipping non-variable line in init dump");
                continue;
            }

            let value = match decode_hex_float(tokens[1]) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(%e, name = tokens[0], "init variable value left unset");
                    None
                }
            };
            vars.push(InitVariable {
                name: tokens[0].to_string(),
                unit: tokens[2].to_string(),
                value,
            });
        }

        info!(count = vars.len(), "init variables acquired");
        Ok(vars)
    }

    /// Background acquisition loop. Parks on the run gate while stopped,
    /// otherwise reads one line per iteration and feeds the row assembler.
    /// Transport errors are treated as no data; the loop only exits on
    /// client shutdown.
    fn spawn_reader(
        transport: Arc<Mutex<T>>,
        log: Arc<SampleLog>,
        gate: Arc<RunGate>,
    ) -> Result<JoinHandle<()>, ProtocolError> {
        let handle = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                let mut assembler: Option<RowAssembler> = None;
                let mut cycle = gate.cycle();
                loop {
                    if !gate.wait_running() {
                        break;
                    }

                    // A new cycle restarts the stream at a block boundary;
                    // drop whatever was half-assembled before the stop.
                    let current = gate.cycle();
                    if current != cycle {
                        cycle = current;
                        if let Some(asm) = assembler.as_mut() {
                            asm.reset();
                        }
                    }

                    let line = match lock_unpoisoned(&transport).read_line() {
                        Ok(line) => line,
                        Err(e) => {
                            debug!(%e, "read error during acquisition, treating as no data");
                            continue;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }

                    // Row width is fixed by label discovery before the gate opens
                    let width = log.width();
                    if width == 0 {
                        continue;
                    }
                    let asm = assembler.get_or_insert_with(|| RowAssembler::new(width));
                    if let Some(row) = asm.push_line(&line) {
                        log.append(row);
                    }
                }
                debug!("acquisition thread exiting");
            })?;
        Ok(handle)
    }

    /// Begin data acquisition: clear the sample log, synchronize the link,
    /// discover the label tables from the first full data block, and wake
    /// the acquisition thread.
    ///
    /// Synchronization drains boot junk until the `INDEX\t0\t1` marker is
    /// seen; an empty read counts an attempt and re-sends `START`, checking
    /// the very next line for the marker. After 5 counted attempts this
    /// fails with [`ProtocolError::Startup`]; the transport stays open.
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        if self.state == ClientState::Closed {
            return Err(ProtocolError::NotConnected);
        }

        self.log.clear_rows();
        info!("starting data acquisition");

        let mut attempts = 0u32;
        let synced = loop {
            if attempts == SYNC_ATTEMPTS {
                break false;
            }
            let mut t = self.transport();
            let line = t.read_line()?;
            if line == SYNC_MARKER {
                break true;
            }
            if line.is_empty() {
                attempts += 1;
                t.send_line(&Command::Start.wire())?;
                let next = t.read_line()?;
                if next == SYNC_MARKER {
                    break true;
                }
            }
            // Non-empty junk is drained without counting an attempt
        };
        if !synced {
            return Err(ProtocolError::Startup {
                attempts: SYNC_ATTEMPTS,
            });
        }
        debug!("link synchronized");

        self.discover_labels()?;
        self.gate.begin_cycle();
        self.state = ClientState::Acquiring;
        Ok(())
    }

    /// Build the header/unit tables from the first full data block. The
    /// tables are fixed once discovered; later calls return immediately.
    fn discover_labels(&mut self) -> Result<(), ProtocolError> {
        if self.log.has_tables() {
            debug!("label tables already discovered");
            return Ok(());
        }

        let mut header = Vec::new();
        let mut units = Vec::new();
        let mut empty_reads = 0u32;

        loop {
            let line = self.transport().read_line()?;
            if line.is_empty() {
                empty_reads += 1;
                if empty_reads >= EMPTY_READ_LIMIT {
                    return Err(ProtocolError::Timeout);
                }
                continue;
            }
            empty_reads = 0;

            match parse_label_line(&line) {
                LabelLine::Value { name, unit } => {
                    header.push(name);
                    units.push(unit);
                }
                LabelLine::Index => break,
                LabelLine::Other => debug!(%line, "ignoring line during label discovery"),
            }
        }

        // Implicit final column: the time index carried by INDEX lines
        header.push("Time Index".to_string());
        info!(columns = header.len(), "label tables discovered");
        self.log.set_tables(header, units);
        Ok(())
    }

    /// Stop data acquisition. Sends `STOP` and parks the acquisition
    /// thread; the thread itself is not joined.
    pub fn stop(&mut self) -> Result<(), ProtocolError> {
        self.transport().send_line(&Command::Stop.wire())?;
        self.gate.set_running(false);
        if self.state == ClientState::Acquiring {
            self.state = ClientState::Idle;
        }
        info!("acquisition stopped");
        Ok(())
    }

    /// Change an init variable on the device: `SET <name> <value>`.
    ///
    /// The value must parse as a float; otherwise the call is rejected with
    /// a warning and no I/O happens. If acquisition is running it is paused
    /// for the duration of the command and resumed afterwards. A successful
    /// send appends a [`SetRecord`] stamped with the latest completed time
    /// index ([`SET_TIME_INDEX_NONE`] when no samples exist yet).
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ProtocolError> {
        let value: f64 = match value.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(name, raw = value, "cannot set: value is not a number");
                return Ok(());
            }
        };

        let was_running = self.gate.set_running(false);
        if was_running {
            debug!("pausing data collection for set command");
        }

        let command = Command::Set {
            name: name.to_string(),
            value,
        };
        let result = (|| {
            let mut t = self.transport();
            t.send_line(&command.wire())?;
            t.flush()?;
            // Bare terminator closes the command on the firmware side
            t.send_line("")
        })();

        if result.is_ok() {
            let time_index = self
                .log
                .latest_time_index()
                .unwrap_or(SET_TIME_INDEX_NONE);
            self.set_records.push(SetRecord {
                name: name.to_string(),
                value,
                time_index,
            });
            info!(name, value, "set command sent");
        }

        if was_running {
            self.gate.set_running(true);
        }
        result
    }

    /// One synchronous request/response exchange: send the command, read
    /// exactly one reply line. No retry.
    fn exchange(&self, command: Command) -> Result<String, ProtocolError> {
        debug_assert!(command.expects_response(), "one-way command in exchange");
        let wire = command.wire();
        let mut t = self.transport();
        t.send_line(&wire)?;
        let reply = t.read_line()?;
        debug!(command = %wire, reply = %reply, "exchange");
        Ok(reply)
    }

    fn parse_f64(command: &Command, reply: &str) -> Result<f64, ProtocolError> {
        reply
            .trim()
            .parse()
            .map_err(|_| ProtocolError::Parse {
                command: command.wire(),
                reply: reply.to_string(),
            })
    }

    /// Current temperature (C)
    pub fn get_temperature(&self) -> Result<f64, ProtocolError> {
        let reply = self.exchange(Command::GetTemperature)?;
        Self::parse_f64(&Command::GetTemperature, &reply)
    }

    /// Current temperature setpoint (C)
    pub fn get_temperature_setpoint(&self) -> Result<f64, ProtocolError> {
        let reply = self.exchange(Command::GetSetpoint)?;
        Self::parse_f64(&Command::GetSetpoint, &reply)
    }

    /// PID control parameters, reported as a comma-separated triple
    pub fn get_parameters(&self) -> Result<PidParameters, ProtocolError> {
        let reply = self.exchange(Command::GetParameters)?;
        let parts: Vec<&str> = reply.trim().split(',').collect();
        if parts.len() != 3 {
            return Err(ProtocolError::Parse {
                command: Command::GetParameters.wire(),
                reply,
            });
        }
        Ok(PidParameters {
            band: Self::parse_f64(&Command::GetParameters, parts[0])?,
            t_i: Self::parse_f64(&Command::GetParameters, parts[1])?,
            t_d: Self::parse_f64(&Command::GetParameters, parts[2])?,
        })
    }

    /// Current operating mode
    pub fn get_mode(&self) -> Result<Mode, ProtocolError> {
        self.exchange(Command::GetMode)?.parse()
    }

    /// Current actuator output in volts, converted from the raw DAC code
    pub fn get_output(&self) -> Result<f64, ProtocolError> {
        let reply = self.exchange(Command::GetOutput)?;
        let code: u32 = reply.trim().parse().map_err(|_| ProtocolError::Parse {
            command: Command::GetOutput.wire(),
            reply: reply.clone(),
        })?;
        let max = (1u32 << DAC_BIT_DEPTH) - 1;
        Ok(DAC_FULL_SCALE_VOLTS * f64::from(code) / f64::from(max))
    }

    /// Control loop period (ms)
    pub fn get_period(&self) -> Result<u64, ProtocolError> {
        let reply = self.exchange(Command::GetPeriod)?;
        reply.trim().parse().map_err(|_| ProtocolError::Parse {
            command: Command::GetPeriod.wire(),
            reply,
        })
    }

    /// Switch the control loop mode. The typed [`Mode`] argument makes an
    /// invalid mode unrepresentable.
    pub fn set_mode(&self, mode: Mode) -> Result<(), ProtocolError> {
        self.transport().send_line(&Command::SetMode(mode).wire())
    }

    /// Change the temperature setpoint (C). Rejected with a warning and no
    /// I/O when above the effective limit (`limit` argument, or the
    /// configured default).
    pub fn set_temperature_setpoint(
        &self,
        temperature: f64,
        limit: Option<f64>,
    ) -> Result<(), ProtocolError> {
        let limit = limit.unwrap_or(self.config.temperature_limit);
        if temperature > limit {
            warn!(temperature, limit, "setpoint above the limit, doing nothing");
            return Ok(());
        }
        self.transport()
            .send_line(&Command::SetTemperature(temperature).wire())
    }

    /// Drive the actuator output directly. Only permitted while the device
    /// reports `OPEN_LOOP`; otherwise a no-op with a diagnostic. The
    /// voltage is converted to the nearest DAC code within the converter's
    /// range.
    pub fn set_output_voltage(&self, volts: f64) -> Result<(), ProtocolError> {
        let mode = self.get_mode()?;
        if mode != Mode::OpenLoop {
            warn!(%mode, "DAC output can only be driven directly in OPEN_LOOP mode");
            return Ok(());
        }
        self.transport()
            .send_line(&Command::SetOutput(dac_code(volts)).wire())
    }

    /// Set the PID control parameters
    pub fn set_parameters(&self, params: PidParameters) -> Result<(), ProtocolError> {
        self.transport()
            .send_line(&Command::SetParameters(params).wire())
    }

    /// Set the control loop period (ms)
    pub fn set_period(&self, period_ms: u64) -> Result<(), ProtocolError> {
        self.transport()
            .send_line(&Command::SetPeriod(period_ms).wire())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Check whether the acquisition thread is collecting
    pub fn is_acquiring(&self) -> bool {
        self.gate.is_running()
    }

    /// Init variables ingested at connect time, in declaration order
    pub fn init_variables(&self) -> &[InitVariable] {
        &self.init_vars
    }

    /// Column names discovered from the first data block
    pub fn header(&self) -> Vec<String> {
        self.log.header()
    }

    /// Unit strings, one per recorded variable
    pub fn units(&self) -> Vec<String> {
        self.log.units()
    }

    /// Snapshot of every completed sample row
    pub fn samples(&self) -> Vec<SampleRow> {
        self.log.snapshot()
    }

    /// The most recent completed sample row
    pub fn latest_sample(&self) -> Option<SampleRow> {
        self.log.latest()
    }

    /// Number of completed sample rows
    pub fn sample_count(&self) -> usize {
        self.log.len()
    }

    /// Record of every successful `SET` operation
    pub fn set_records(&self) -> &[SetRecord] {
        &self.set_records
    }

    /// Stop acquisition, retire the background thread, and close the
    /// transport. Safe to call more than once.
    pub fn disconnect(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        if self.gate.is_running() {
            let _ = self.transport().send_line(&Command::Stop.wire());
        }
        self.gate.set_running(false);
        self.gate.shutdown();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        self.transport().close();
        self.state = ClientState::Closed;
        info!("disconnected");
    }
}

impl<T: LineTransport + 'static> Drop for Client<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
