//! Protocol commands
//!
//! Defines the ASCII command set understood by the controller firmware.
//! Acquisition-control commands are single uppercase tokens; parameter
//! get/set commands are lowercase with comma-separated arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ProtocolError;

/// Control-loop operating mode of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Actuator output is driven directly via `set_dac`
    OpenLoop,
    /// Actuator output is driven by the PID loop toward the setpoint
    ClosedLoop,
}

impl Mode {
    /// Wire representation of the mode
    pub fn as_wire(&self) -> &'static str {
        match self {
            Mode::OpenLoop => "OPEN_LOOP",
            Mode::ClosedLoop => "CLOSED_LOOP",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OPEN_LOOP" => Ok(Mode::OpenLoop),
            "CLOSED_LOOP" => Ok(Mode::ClosedLoop),
            other => Err(ProtocolError::Parse {
                command: "get_mode".to_string(),
                reply: other.to_string(),
            }),
        }
    }
}

/// PID control parameters as reported by `get_parameters`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParameters {
    /// Proportional band
    pub band: f64,
    /// Integral time
    pub t_i: f64,
    /// Derivative time
    pub t_d: f64,
}

/// Commands understood by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Link check; the controller echoes `HANDSHAKE` then dumps its init variables
    Handshake,
    /// Begin streaming `INDEX`/`VALUE` data blocks
    Start,
    /// Stop streaming
    Stop,
    /// Change an init variable while acquiring
    Set {
        /// Variable name as reported in the init dump
        name: String,
        /// New value
        value: f64,
    },
    /// Query the current temperature (C)
    GetTemperature,
    /// Query the temperature setpoint (C)
    GetSetpoint,
    /// Query the PID parameters (comma-separated triple)
    GetParameters,
    /// Query the operating mode
    GetMode,
    /// Query the raw DAC output code
    GetOutput,
    /// Query the control loop period (ms)
    GetPeriod,
    /// Change the temperature setpoint (C)
    SetTemperature(f64),
    /// Change the operating mode
    SetMode(Mode),
    /// Drive the DAC with a raw output code (open loop only)
    SetOutput(u32),
    /// Change the PID parameters
    SetParameters(PidParameters),
    /// Change the control loop period (ms)
    SetPeriod(u64),
}

impl Command {
    /// Wire string for this command, without the line terminator
    pub fn wire(&self) -> String {
        match self {
            Command::Handshake => "HANDSHAKE".to_string(),
            Command::Start => "START".to_string(),
            Command::Stop => "STOP".to_string(),
            Command::Set { name, value } => format!("SET {name} {value}"),
            Command::GetTemperature => "get_temperature".to_string(),
            Command::GetSetpoint => "get_setpoint".to_string(),
            Command::GetParameters => "get_parameters".to_string(),
            Command::GetMode => "get_mode".to_string(),
            Command::GetOutput => "get_dac".to_string(),
            Command::GetPeriod => "get_period".to_string(),
            Command::SetTemperature(t) => format!("set_temperature,{t}"),
            Command::SetMode(mode) => format!("set_mode,{mode}"),
            Command::SetOutput(code) => format!("set_dac,{code}"),
            Command::SetParameters(p) => {
                format!("set_parameters,{:.2},{:.2},{:.2}", p.band, p.t_i, p.t_d)
            }
            Command::SetPeriod(ms) => format!("set_period,{ms}"),
        }
    }

    /// Check if this command expects a single reply line
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            Command::Handshake
                | Command::GetTemperature
                | Command::GetSetpoint
                | Command::GetParameters
                | Command::GetMode
                | Command::GetOutput
                | Command::GetPeriod
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_strings() {
        assert_eq!(Command::Handshake.wire(), "HANDSHAKE");
        assert_eq!(Command::Start.wire(), "START");
        assert_eq!(Command::Stop.wire(), "STOP");
        assert_eq!(
            Command::Set {
                name: "SETPOINT".to_string(),
                value: 30.5
            }
            .wire(),
            "SET SETPOINT 30.5"
        );
        assert_eq!(Command::SetTemperature(21.5).wire(), "set_temperature,21.5");
        assert_eq!(Command::SetMode(Mode::OpenLoop).wire(), "set_mode,OPEN_LOOP");
        assert_eq!(Command::SetOutput(4095).wire(), "set_dac,4095");
        assert_eq!(
            Command::SetParameters(PidParameters {
                band: 10.0,
                t_i: 120.0,
                t_d: 5.0
            })
            .wire(),
            "set_parameters,10.00,120.00,5.00"
        );
    }

    #[test]
    fn test_mode_round_trip() {
        for mode in [Mode::OpenLoop, Mode::ClosedLoop] {
            assert_eq!(mode.as_wire().parse::<Mode>().unwrap(), mode);
        }
        assert!("PANIC_LOOP".parse::<Mode>().is_err());
    }

    #[test]
    fn test_expects_response() {
        assert!(Command::GetTemperature.expects_response());
        assert!(Command::Handshake.expects_response());
        assert!(!Command::Stop.expects_response());
        assert!(!Command::SetMode(Mode::ClosedLoop).expects_response());
    }
}
