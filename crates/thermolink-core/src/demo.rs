//! Demo mode - simulated controller for testing without hardware
//!
//! [`DemoDevice`] implements [`LineTransport`] by emulating the firmware:
//! it answers the handshake, dumps init variables, honours the command set,
//! and streams plausible `VALUE`/`INDEX` blocks with the temperature
//! relaxing toward the setpoint plus measurement noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use crate::protocol::hex::encode_hex_float;
use crate::protocol::{LineTransport, Mode, PidParameters, ProtocolError};

/// Ambient temperature the simulated plant drifts toward when unheated (C)
const AMBIENT_C: f64 = 22.0;

/// Simulated temperature controller
pub struct DemoDevice {
    rng: StdRng,
    /// Lines queued for the next `read_line` calls
    outbox: VecDeque<String>,
    open: bool,
    streaming: bool,
    time_index: i64,
    temperature: f64,
    setpoint: f64,
    mode: Mode,
    params: PidParameters,
    dac_code: u32,
    period_ms: u64,
}

impl Default for DemoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoDevice {
    /// Create a simulated controller at ambient temperature
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            outbox: VecDeque::new(),
            open: true,
            streaming: false,
            time_index: 0,
            temperature: AMBIENT_C,
            setpoint: 25.0,
            mode: Mode::ClosedLoop,
            params: PidParameters {
                band: 10.0,
                t_i: 120.0,
                t_d: 5.0,
            },
            dac_code: 0,
            period_ms: 500,
        }
    }

    /// Deterministic variant for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    fn queue_init_dump(&mut self) {
        // Banner row, discarded by the client during ingestion
        self.outbox.push_back("INIT VARIABLES:".to_string());
        let vars: [(&str, f32, &str); 5] = [
            ("SETPOINT", self.setpoint as f32, "C"),
            ("BAND", self.params.band as f32, "C"),
            ("T_INTEGRAL", self.params.t_i as f32, "s"),
            ("T_DERIVATIVE", self.params.t_d as f32, "s"),
            ("PERIOD", self.period_ms as f32, "ms"),
        ];
        for (name, value, unit) in vars {
            self.outbox
                .push_back(format!("{name}\t=\t{}\t{unit}", encode_hex_float(value)));
        }
        self.outbox.push_back("READY".to_string());
    }

    /// Advance the thermal model by one loop period and queue one data block
    fn queue_data_block(&mut self) {
        let target = match self.mode {
            Mode::ClosedLoop => self.setpoint,
            Mode::OpenLoop => AMBIENT_C + 10.0 * f64::from(self.dac_code) / 4095.0,
        };
        let noise = self.rng.gen_range(-0.05..0.05);
        self.temperature += 0.1 * (target - self.temperature) + noise;
        self.time_index += 1;

        let output_volts = 5.0 * f64::from(self.dac_code) / 4095.0;
        let values: [(&str, f64, &str); 3] = [
            ("Temperature", self.temperature, "C"),
            ("Setpoint", self.setpoint, "C"),
            ("Output", output_volts, "V"),
        ];
        for (slot, (name, value, unit)) in values.iter().enumerate() {
            self.outbox.push_back(format!(
                "VALUE\t{name}\t{slot}\t{}\t{unit}",
                encode_hex_float(*value as f32)
            ));
        }
        self.outbox
            .push_back(format!("INDEX\t0\t{}", self.time_index));
    }

    fn handle_command(&mut self, line: &str) {
        match line {
            "" => {}
            "HANDSHAKE" => {
                self.outbox.push_back("HANDSHAKE".to_string());
                self.queue_init_dump();
            }
            "START" => {
                self.streaming = true;
                self.time_index = 0;
                self.outbox.push_back("INDEX\t0\t1".to_string());
            }
            "STOP" => self.streaming = false,
            "get_temperature" => {
                let reply = format!("{:.2}", self.temperature);
                self.outbox.push_back(reply);
            }
            "get_setpoint" => {
                let reply = format!("{:.2}", self.setpoint);
                self.outbox.push_back(reply);
            }
            "get_parameters" => {
                let p = self.params;
                self.outbox
                    .push_back(format!("{:.2},{:.2},{:.2}", p.band, p.t_i, p.t_d));
            }
            "get_mode" => self.outbox.push_back(self.mode.as_wire().to_string()),
            "get_dac" => self.outbox.push_back(self.dac_code.to_string()),
            "get_period" => self.outbox.push_back(self.period_ms.to_string()),
            other => self.handle_parameterized(other),
        }
    }

    fn handle_parameterized(&mut self, line: &str) {
        if let Some(rest) = line.strip_prefix("SET ") {
            let mut parts = rest.split_whitespace();
            if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
                if let Ok(v) = value.parse::<f64>() {
                    self.apply_set(name, v);
                }
            }
        } else if let Some(v) = line.strip_prefix("set_temperature,") {
            if let Ok(t) = v.parse() {
                self.setpoint = t;
            }
        } else if let Some(m) = line.strip_prefix("set_mode,") {
            if let Ok(mode) = m.parse() {
                self.mode = mode;
            }
        } else if let Some(c) = line.strip_prefix("set_dac,") {
            if let Ok(code) = c.parse() {
                self.dac_code = code;
            }
        } else if let Some(p) = line.strip_prefix("set_parameters,") {
            let parts: Vec<f64> = p.split(',').filter_map(|s| s.parse().ok()).collect();
            if let [band, t_i, t_d] = parts[..] {
                self.params = PidParameters { band, t_i, t_d };
            }
        } else if let Some(ms) = line.strip_prefix("set_period,") {
            if let Ok(period) = ms.parse() {
                self.period_ms = period;
            }
        }
    }

    fn apply_set(&mut self, name: &str, value: f64) {
        match name {
            "SETPOINT" => self.setpoint = value,
            "BAND" => self.params.band = value,
            "T_INTEGRAL" => self.params.t_i = value,
            "T_DERIVATIVE" => self.params.t_d = value,
            "PERIOD" => self.period_ms = value as u64,
            _ => {}
        }
    }
}

impl LineTransport for DemoDevice {
    fn send_line(&mut self, text: &str) -> Result<(), ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        self.handle_command(text);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        if let Some(line) = self.outbox.pop_front() {
            return Ok(line);
        }
        if self.streaming {
            self.queue_data_block();
            return Ok(self.outbox.pop_front().unwrap_or_default());
        }
        // Nothing to say: emulate a read timeout
        Ok(String::new())
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn reboot(&mut self) -> Result<(), ProtocolError> {
        self.outbox.clear();
        self.streaming = false;
        self.time_index = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
