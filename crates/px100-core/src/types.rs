//! Register, command, and value types for the PX100 load.
//!
//! The register and command tables are closed enumerations with exhaustive
//! `match` mappings, so a missing entry is a compile error rather than a
//! failed lookup at runtime.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Divisor used for scaled registers that do not declare their own.
pub const DEFAULT_SCALE: u32 = 1000;

/// The timer is written as a 16-bit second count.
pub const MAX_TIMER_SECONDS: u32 = u16::MAX as u32;

/// How the 3-byte payload of a register is turned into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeKind {
    /// Big-endian unsigned integer divided by the given scale.
    Scaled(u32),
    /// Big-endian unsigned integer, non-zero means on.
    Boolean,
    /// Three bytes read positionally as hours, minutes, seconds.
    Hms,
}

/// A readable register of the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterAddress {
    /// Output (load) enabled.
    IsOn,
    /// Measured voltage in volts.
    Voltage,
    /// Measured current in amperes.
    Current,
    /// Elapsed discharge time.
    Time,
    /// Accumulated capacity in ampere-hours.
    CapacityAh,
    /// Accumulated energy in watt-hours.
    CapacityWh,
    /// Heatsink temperature in degrees Celsius.
    Temperature,
    /// Current setpoint in amperes.
    CurrentLimit,
    /// Cut-off voltage setpoint in volts.
    VoltageLimit,
    /// Discharge timer setpoint.
    Timer,
}

impl RegisterAddress {
    /// Every register, in wire-code order.
    pub const ALL: [RegisterAddress; 10] = [
        RegisterAddress::IsOn,
        RegisterAddress::Voltage,
        RegisterAddress::Current,
        RegisterAddress::Time,
        RegisterAddress::CapacityAh,
        RegisterAddress::CapacityWh,
        RegisterAddress::Temperature,
        RegisterAddress::CurrentLimit,
        RegisterAddress::VoltageLimit,
        RegisterAddress::Timer,
    ];

    /// Wire code sent in the request frame.
    pub fn code(&self) -> u8 {
        match self {
            RegisterAddress::IsOn => 0x10,
            RegisterAddress::Voltage => 0x11,
            RegisterAddress::Current => 0x12,
            RegisterAddress::Time => 0x13,
            RegisterAddress::CapacityAh => 0x14,
            RegisterAddress::CapacityWh => 0x15,
            RegisterAddress::Temperature => 0x16,
            RegisterAddress::CurrentLimit => 0x17,
            RegisterAddress::VoltageLimit => 0x18,
            RegisterAddress::Timer => 0x19,
        }
    }

    /// Look a register up by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.code() == code)
    }

    /// How this register's payload is decoded.
    pub fn decode_kind(&self) -> DecodeKind {
        match self {
            RegisterAddress::IsOn => DecodeKind::Boolean,
            RegisterAddress::Time | RegisterAddress::Timer => DecodeKind::Hms,
            RegisterAddress::Temperature => DecodeKind::Scaled(1),
            RegisterAddress::Voltage
            | RegisterAddress::Current
            | RegisterAddress::CapacityAh
            | RegisterAddress::CapacityWh => DecodeKind::Scaled(1000),
            RegisterAddress::CurrentLimit | RegisterAddress::VoltageLimit => {
                DecodeKind::Scaled(100)
            }
        }
    }

    /// Divisor applied to the raw payload.
    ///
    /// On/off reads as scale 1; the time registers have no scale of their
    /// own and report [`DEFAULT_SCALE`].
    pub fn scale(&self) -> u32 {
        match self.decode_kind() {
            DecodeKind::Scaled(scale) => scale,
            DecodeKind::Boolean => 1,
            DecodeKind::Hms => DEFAULT_SCALE,
        }
    }

    /// Short key used in logs, CSV headers, and `FromStr`.
    pub fn key(&self) -> &'static str {
        match self {
            RegisterAddress::IsOn => "is_on",
            RegisterAddress::Voltage => "voltage",
            RegisterAddress::Current => "current",
            RegisterAddress::Time => "time",
            RegisterAddress::CapacityAh => "cap_ah",
            RegisterAddress::CapacityWh => "cap_wh",
            RegisterAddress::Temperature => "temp",
            RegisterAddress::CurrentLimit => "set_current",
            RegisterAddress::VoltageLimit => "set_voltage",
            RegisterAddress::Timer => "set_timer",
        }
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error returned when a string names no known register or command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(String);

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown key: {}", self.0)
    }
}

impl std::error::Error for ParseKeyError {}

impl FromStr for RegisterAddress {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.key() == lower)
            .ok_or_else(|| ParseKeyError(s.to_string()))
    }
}

/// Registers read on every poll cycle.
pub const FREQUENT_GROUP: [RegisterAddress; 5] = [
    RegisterAddress::IsOn,
    RegisterAddress::Voltage,
    RegisterAddress::Current,
    RegisterAddress::Time,
    RegisterAddress::CapacityAh,
];

/// Slower-changing registers read once every few poll cycles.
pub const AUX_GROUP: [RegisterAddress; 5] = [
    RegisterAddress::CapacityWh,
    RegisterAddress::Temperature,
    RegisterAddress::CurrentLimit,
    RegisterAddress::VoltageLimit,
    RegisterAddress::Timer,
];

/// A high-level instrument command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Switch the load on or off.
    Enable,
    /// Set the cut-off voltage.
    SetVoltage,
    /// Set the discharge current.
    SetCurrent,
    /// Set the discharge timer.
    SetTimer,
    /// Reset the capacity/energy/time counters.
    Reset,
}

impl CommandKind {
    /// Every command kind.
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Enable,
        CommandKind::SetVoltage,
        CommandKind::SetCurrent,
        CommandKind::SetTimer,
        CommandKind::Reset,
    ];

    /// Wire code of the register written by this command.
    pub fn target_code(&self) -> u8 {
        match self {
            CommandKind::Enable => 0x01,
            CommandKind::SetCurrent => 0x02,
            CommandKind::SetVoltage => 0x03,
            CommandKind::SetTimer => 0x04,
            CommandKind::Reset => 0x05,
        }
    }

    /// Register read back to confirm the command took effect.
    pub fn verify_register(&self) -> RegisterAddress {
        match self {
            CommandKind::Enable => RegisterAddress::IsOn,
            CommandKind::SetVoltage => RegisterAddress::VoltageLimit,
            CommandKind::SetCurrent => RegisterAddress::CurrentLimit,
            CommandKind::SetTimer => RegisterAddress::Timer,
            CommandKind::Reset => RegisterAddress::CapacityAh,
        }
    }

    /// Short key used in logs and `FromStr`.
    pub fn key(&self) -> &'static str {
        match self {
            CommandKind::Enable => "enable",
            CommandKind::SetVoltage => "set_voltage",
            CommandKind::SetCurrent => "set_current",
            CommandKind::SetTimer => "set_timer",
            CommandKind::Reset => "reset",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CommandKind {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.key() == lower)
            .ok_or_else(|| ParseKeyError(s.to_string()))
    }
}

/// Hours, minutes and seconds as the instrument counts them.
///
/// Hours run up to 255, so a discharge longer than a day still decodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hms {
    hours: u8,
    minutes: u8,
    seconds: u8,
}

impl Hms {
    /// `None` unless minutes and seconds are below 60.
    pub fn new(hours: u8, minutes: u8, seconds: u8) -> Option<Self> {
        (minutes < 60 && seconds < 60).then_some(Hms {
            hours,
            minutes,
            seconds,
        })
    }

    /// Split a second count. `None` past 255:59:59.
    pub fn from_seconds(total: u32) -> Option<Self> {
        let hours = u8::try_from(total / 3600).ok()?;
        Some(Hms {
            hours,
            minutes: ((total / 60) % 60) as u8,
            seconds: (total % 60) as u8,
        })
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    /// Total length in seconds.
    pub fn as_seconds(&self) -> u32 {
        u32::from(self.hours) * 3600 + u32::from(self.minutes) * 60 + u32::from(self.seconds)
    }
}

impl fmt::Display for Hms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

impl FromStr for Hms {
    type Err = Error;

    /// Parse `H:MM:SS`; hours may have one to three digits.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidParameter(format!("expected HH:MM:SS, got {s:?}"));
        let mut parts = s.split(':').map(|p| p.parse::<u8>().map_err(|_| invalid()));
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Hms::new(h?, m?, sec?).ok_or_else(invalid)
    }
}

/// A decoded register value or a command argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// On/off state.
    Bool(bool),
    /// Scaled decimal (volts, amperes, Ah, Wh, degrees).
    Decimal(f64),
    /// Elapsed time or timer setpoint.
    Time(Hms),
    /// Plain integer argument (the reset sentinel).
    Integer(u16),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Decimal(v) => Some(*v),
            Value::Integer(v) => Some(f64::from(*v)),
            Value::Bool(_) | Value::Time(_) => None,
        }
    }

    /// The value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as hours/minutes/seconds, if it is one.
    pub fn as_time(&self) -> Option<Hms> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "on"),
            Value::Bool(false) => write!(f, "off"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Integer(v) => write!(f, "{v}"),
        }
    }
}

/// A command waiting in the worker's intake queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandRequest {
    /// Which command to run.
    pub kind: CommandKind,
    /// Requested value, already checked against `kind`.
    pub value: Value,
}

impl CommandRequest {
    /// Build a request, rejecting values of the wrong shape for `kind`.
    pub fn new(kind: CommandKind, value: Value) -> Result<Self> {
        let value = match (kind, value) {
            (CommandKind::Enable, Value::Bool(_)) => value,
            (CommandKind::SetVoltage | CommandKind::SetCurrent, Value::Decimal(v)) => {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::InvalidParameter(format!(
                        "{kind} needs a non-negative value, got {v}"
                    )));
                }
                value
            }
            (CommandKind::SetTimer, Value::Time(t)) => {
                if t.as_seconds() > MAX_TIMER_SECONDS {
                    return Err(Error::InvalidParameter(format!(
                        "{kind} is limited to {MAX_TIMER_SECONDS} seconds, got {t}"
                    )));
                }
                value
            }
            (CommandKind::Reset, Value::Integer(0)) => value,
            (CommandKind::Reset, Value::Decimal(v)) if v == 0.0 => Value::Integer(0),
            (kind, value) => {
                return Err(Error::InvalidParameter(format!(
                    "{kind} does not accept {value:?}"
                )));
            }
        };
        Ok(CommandRequest { kind, value })
    }

    /// Parse a command argument from text (`on`/`off`, `3.14`, `01:02:03`).
    pub fn parse(kind: CommandKind, text: &str) -> Result<Self> {
        let text = text.trim();
        let value = match kind {
            CommandKind::Enable => match text.to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Value::Bool(true),
                "off" | "false" | "0" => Value::Bool(false),
                other => {
                    return Err(Error::InvalidParameter(format!(
                        "expected on/off, got {other:?}"
                    )));
                }
            },
            CommandKind::SetVoltage | CommandKind::SetCurrent => {
                let v: f64 = text.parse().map_err(|_| {
                    Error::InvalidParameter(format!("expected a decimal, got {text:?}"))
                })?;
                Value::Decimal(v)
            }
            CommandKind::SetTimer => Value::Time(text.parse()?),
            CommandKind::Reset => Value::Integer(0),
        };
        Self::new(kind, value)
    }

    /// Switch the load on or off.
    pub fn enable(on: bool) -> Self {
        CommandRequest {
            kind: CommandKind::Enable,
            value: Value::Bool(on),
        }
    }

    /// Set the cut-off voltage.
    pub fn set_voltage(volts: f64) -> Result<Self> {
        Self::new(CommandKind::SetVoltage, Value::Decimal(volts))
    }

    /// Set the discharge current.
    pub fn set_current(amps: f64) -> Result<Self> {
        Self::new(CommandKind::SetCurrent, Value::Decimal(amps))
    }

    /// Set the discharge timer.
    pub fn set_timer(time: Hms) -> Result<Self> {
        Self::new(CommandKind::SetTimer, Value::Time(time))
    }

    /// Reset the accumulated counters.
    pub fn reset() -> Self {
        CommandRequest {
            kind: CommandKind::Reset,
            value: Value::Integer(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_codes_are_contiguous() {
        for (i, reg) in RegisterAddress::ALL.iter().enumerate() {
            assert_eq!(reg.code(), 0x10 + i as u8);
            assert_eq!(RegisterAddress::from_code(reg.code()), Some(*reg));
        }
        assert_eq!(RegisterAddress::from_code(0x01), None);
    }

    #[test]
    fn register_scales() {
        assert_eq!(RegisterAddress::IsOn.scale(), 1);
        assert_eq!(RegisterAddress::Temperature.scale(), 1);
        assert_eq!(RegisterAddress::Voltage.scale(), 1000);
        assert_eq!(RegisterAddress::CapacityWh.scale(), 1000);
        assert_eq!(RegisterAddress::CurrentLimit.scale(), 100);
        assert_eq!(RegisterAddress::VoltageLimit.scale(), 100);
        assert_eq!(RegisterAddress::Timer.scale(), DEFAULT_SCALE);
        assert_eq!(RegisterAddress::Time.decode_kind(), DecodeKind::Hms);
    }

    #[test]
    fn groups_cover_every_register_once() {
        let mut all: Vec<_> = FREQUENT_GROUP.iter().chain(AUX_GROUP.iter()).collect();
        all.sort_by_key(|r| r.code());
        all.dedup();
        assert_eq!(all.len(), RegisterAddress::ALL.len());
    }

    #[test]
    fn command_tables() {
        assert_eq!(CommandKind::Enable.target_code(), 0x01);
        assert_eq!(CommandKind::SetCurrent.target_code(), 0x02);
        assert_eq!(CommandKind::SetVoltage.target_code(), 0x03);
        assert_eq!(CommandKind::SetTimer.target_code(), 0x04);
        assert_eq!(CommandKind::Reset.target_code(), 0x05);
        assert_eq!(
            CommandKind::SetVoltage.verify_register(),
            RegisterAddress::VoltageLimit
        );
        assert_eq!(
            CommandKind::Reset.verify_register(),
            RegisterAddress::CapacityAh
        );
        for kind in CommandKind::ALL {
            assert!(kind.target_code() < 0x10);
        }
    }

    #[test]
    fn keys_round_trip_through_from_str() {
        for reg in RegisterAddress::ALL {
            assert_eq!(reg.to_string().parse::<RegisterAddress>(), Ok(reg));
        }
        for kind in CommandKind::ALL {
            assert_eq!(kind.to_string().parse::<CommandKind>(), Ok(kind));
        }
        assert!("SET_VOLTAGE".parse::<CommandKind>().is_ok());
        assert!("bogus".parse::<CommandKind>().is_err());
    }

    #[test]
    fn request_rejects_wrong_value_shape() {
        assert!(CommandRequest::new(CommandKind::Enable, Value::Decimal(1.0)).is_err());
        assert!(CommandRequest::new(CommandKind::SetTimer, Value::Bool(true)).is_err());
        assert!(CommandRequest::new(CommandKind::SetVoltage, Value::Decimal(-1.0)).is_err());
        assert!(CommandRequest::new(CommandKind::SetCurrent, Value::Decimal(f64::NAN)).is_err());
        assert!(CommandRequest::new(CommandKind::Reset, Value::Integer(3)).is_err());
    }

    #[test]
    fn reset_accepts_decimal_zero() {
        let req = CommandRequest::new(CommandKind::Reset, Value::Decimal(0.0)).unwrap();
        assert_eq!(req.value, Value::Integer(0));
        assert_eq!(req, CommandRequest::reset());
    }

    #[test]
    fn parse_arguments() {
        assert_eq!(
            CommandRequest::parse(CommandKind::Enable, "ON").unwrap(),
            CommandRequest::enable(true)
        );
        assert_eq!(
            CommandRequest::parse(CommandKind::SetVoltage, " 3.14 ").unwrap().value,
            Value::Decimal(3.14)
        );
        let t = Hms::new(1, 2, 3).unwrap();
        assert_eq!(
            CommandRequest::parse(CommandKind::SetTimer, "01:02:03").unwrap(),
            CommandRequest::set_timer(t).unwrap()
        );
        assert!(CommandRequest::parse(CommandKind::SetTimer, "1h").is_err());
        assert!(CommandRequest::parse(CommandKind::Enable, "maybe").is_err());
    }

    #[test]
    fn hms_past_one_day() {
        let t = Hms::from_seconds(24 * 3600 + 5).unwrap();
        assert_eq!((t.hours(), t.minutes(), t.seconds()), (24, 0, 5));
        assert_eq!(t.as_seconds(), 86_405);
        assert_eq!(Hms::from_seconds(256 * 3600), None);
        assert_eq!(Hms::from_seconds(256 * 3600 - 1), Hms::new(255, 59, 59));
        assert_eq!(Hms::new(0, 60, 0), None);
        assert_eq!(Hms::new(0, 0, 60), None);
    }

    #[test]
    fn hms_from_str() {
        assert_eq!("26:15:00".parse::<Hms>().unwrap(), Hms::new(26, 15, 0).unwrap());
        assert_eq!("1:02:03".parse::<Hms>().unwrap(), Hms::new(1, 2, 3).unwrap());
        assert!("00:61:00".parse::<Hms>().is_err());
        assert!("256:00:00".parse::<Hms>().is_err());
        assert!("01:02".parse::<Hms>().is_err());
        assert!("01:02:03:04".parse::<Hms>().is_err());
        assert!("1h".parse::<Hms>().is_err());
    }

    #[test]
    fn timer_request_limited_to_sixteen_bits() {
        assert!(CommandRequest::set_timer(Hms::new(18, 12, 15).unwrap()).is_ok());
        assert!(CommandRequest::set_timer(Hms::new(18, 12, 16).unwrap()).is_err());
        assert!(CommandRequest::parse(CommandKind::SetTimer, "30:00:00").is_err());
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Bool(true).to_string(), "on");
        assert_eq!(Value::Decimal(1.5).to_string(), "1.5");
        let t = Hms::new(0, 5, 9).unwrap();
        assert_eq!(Value::Time(t).to_string(), "00:05:09");
        let long = Hms::new(100, 0, 1).unwrap();
        assert_eq!(Value::Time(long).to_string(), "100:00:01");
        assert_eq!(Value::Integer(0).as_f64(), Some(0.0));
    }
}
