//! Conversion between register payloads and semantic [`Value`]s.
//!
//! Reads carry a 3-byte big-endian payload that is either divided by the
//! register's scale, treated as an on/off flag, or read positionally as
//! hours/minutes/seconds. Writes carry a 2-byte payload whose layout
//! depends on the value being sent.

use px100_core::{CommandKind, DecodeKind, Error, Hms, RegisterAddress, Result, Value};

/// Largest raw value a 3-byte payload can carry.
pub const MAX_RAW: u32 = 0x00FF_FFFF;

/// Payload the instrument expects for "output on".
pub const ENABLE_PAYLOAD: [u8; 2] = [0x01, 0x00];

/// Interpret a 3-byte payload as a big-endian unsigned integer.
pub fn payload_to_raw(payload: [u8; 3]) -> u32 {
    u32::from_be_bytes([0, payload[0], payload[1], payload[2]])
}

/// Pack a raw integer into a 3-byte big-endian payload.
pub fn raw_to_payload(raw: u32) -> Result<[u8; 3]> {
    if raw > MAX_RAW {
        return Err(Error::InvalidParameter(format!(
            "raw value {raw} does not fit in 3 bytes"
        )));
    }
    let [_, a, b, c] = raw.to_be_bytes();
    Ok([a, b, c])
}

/// Decode a read payload for `register`.
///
/// # Example
///
/// ```
/// use px100_core::{RegisterAddress, Value};
/// use px100_protocol::value::decode_payload;
///
/// // 12000 / 1000
/// let v = decode_payload(RegisterAddress::Voltage, [0x00, 0x2E, 0xE0]).unwrap();
/// assert_eq!(v, Value::Decimal(12.0));
/// ```
pub fn decode_payload(register: RegisterAddress, payload: [u8; 3]) -> Result<Value> {
    match register.decode_kind() {
        DecodeKind::Boolean => Ok(Value::Bool(payload_to_raw(payload) != 0)),
        DecodeKind::Scaled(scale) => Ok(Value::Decimal(
            f64::from(payload_to_raw(payload)) / f64::from(scale),
        )),
        DecodeKind::Hms => {
            let [h, m, s] = payload;
            Hms::new(h, m, s).map(Value::Time).ok_or_else(|| {
                Error::Frame(format!("{register}: invalid time {h:02}:{m:02}:{s:02}"))
            })
        }
    }
}

/// Encode a decimal as `[integer part, hundredths]`.
fn encode_decimal(v: f64) -> Result<[u8; 2]> {
    if !v.is_finite() || v < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "cannot encode {v}: must be finite and non-negative"
        )));
    }
    let whole = v.trunc();
    if whole > f64::from(u8::MAX) {
        return Err(Error::InvalidParameter(format!(
            "cannot encode {v}: integer part exceeds 255"
        )));
    }
    let hundredths = ((v - whole) * 100.0).round();
    Ok([whole as u8, hundredths as u8])
}

/// Encode a duration as total seconds, 2 bytes big-endian.
fn encode_time(t: Hms) -> Result<[u8; 2]> {
    let secs = u16::try_from(t.as_seconds()).map_err(|_| {
        Error::InvalidParameter(format!("cannot encode {t}: more than {} seconds", u16::MAX))
    })?;
    Ok(secs.to_be_bytes())
}

/// Encode the 2-byte write payload for `kind` carrying `value`.
///
/// # Example
///
/// ```
/// use px100_core::{CommandKind, Value};
/// use px100_protocol::value::encode_value;
///
/// assert_eq!(encode_value(CommandKind::SetVoltage, Value::Decimal(3.14)).unwrap(), [3, 14]);
/// assert_eq!(encode_value(CommandKind::Enable, Value::Bool(true)).unwrap(), [0x01, 0x00]);
/// ```
pub fn encode_value(kind: CommandKind, value: Value) -> Result<[u8; 2]> {
    match value {
        Value::Bool(true) if kind == CommandKind::Enable => Ok(ENABLE_PAYLOAD),
        Value::Bool(b) => Ok(u16::from(b).to_be_bytes()),
        Value::Decimal(v) => encode_decimal(v),
        Value::Time(t) => encode_time(t),
        Value::Integer(n) => Ok(n.to_be_bytes()),
    }
}

/// Compare a requested value with what the verification register reports.
///
/// Numbers are compared at the register's resolution (half of one
/// `1/scale` step), so a setpoint of 3.14 read back as `314 / 100` matches
/// even though the two `f64`s differ in the last bits.
pub fn values_match(register: RegisterAddress, requested: Value, observed: Value) -> bool {
    match (requested, observed) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Time(a), Value::Time(b)) => a == b,
        (requested, observed) => match (requested.as_f64(), observed.as_f64()) {
            (Some(a), Some(b)) => {
                let half_step = 0.5 / f64::from(register.scale());
                (a - b).abs() < half_step
            }
            _ => false,
        },
    }
}
