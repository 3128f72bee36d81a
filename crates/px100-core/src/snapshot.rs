//! Decoded measurement snapshots.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::{Hms, RegisterAddress, Value};

/// One poll's worth of decoded register values.
///
/// The worker keeps a working copy and hands out clones, so a snapshot a
/// consumer holds never changes underneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSnapshot {
    /// When the poll that produced this snapshot completed.
    pub captured_at: DateTime<Utc>,
    pub is_on: bool,
    pub voltage: f64,
    pub current: f64,
    pub time: Hms,
    pub cap_ah: f64,
    pub cap_wh: f64,
    pub temp: f64,
    pub set_current: f64,
    pub set_voltage: f64,
    pub set_timer: Hms,
}

impl Default for MeasurementSnapshot {
    fn default() -> Self {
        MeasurementSnapshot {
            captured_at: DateTime::<Utc>::default(),
            is_on: false,
            voltage: 0.0,
            current: 0.0,
            time: Hms::default(),
            cap_ah: 0.0,
            cap_wh: 0.0,
            temp: 0.0,
            set_current: 0.0,
            set_voltage: 0.0,
            set_timer: Hms::default(),
        }
    }
}

impl MeasurementSnapshot {
    /// Read one register's value out of the snapshot.
    pub fn get(&self, register: RegisterAddress) -> Value {
        match register {
            RegisterAddress::IsOn => Value::Bool(self.is_on),
            RegisterAddress::Voltage => Value::Decimal(self.voltage),
            RegisterAddress::Current => Value::Decimal(self.current),
            RegisterAddress::Time => Value::Time(self.time),
            RegisterAddress::CapacityAh => Value::Decimal(self.cap_ah),
            RegisterAddress::CapacityWh => Value::Decimal(self.cap_wh),
            RegisterAddress::Temperature => Value::Decimal(self.temp),
            RegisterAddress::CurrentLimit => Value::Decimal(self.set_current),
            RegisterAddress::VoltageLimit => Value::Decimal(self.set_voltage),
            RegisterAddress::Timer => Value::Time(self.set_timer),
        }
    }

    /// Store a freshly decoded value.
    ///
    /// Fails if the value's shape does not match the register.
    pub fn update(&mut self, register: RegisterAddress, value: Value) -> Result<()> {
        match (register, value) {
            (RegisterAddress::IsOn, Value::Bool(b)) => self.is_on = b,
            (RegisterAddress::Time, Value::Time(t)) => self.time = t,
            (RegisterAddress::Timer, Value::Time(t)) => self.set_timer = t,
            (register, value) => {
                let v = value.as_f64().ok_or_else(|| {
                    Error::InvalidParameter(format!("{register} cannot hold {value:?}"))
                })?;
                let slot = match register {
                    RegisterAddress::Voltage => &mut self.voltage,
                    RegisterAddress::Current => &mut self.current,
                    RegisterAddress::CapacityAh => &mut self.cap_ah,
                    RegisterAddress::CapacityWh => &mut self.cap_wh,
                    RegisterAddress::Temperature => &mut self.temp,
                    RegisterAddress::CurrentLimit => &mut self.set_current,
                    RegisterAddress::VoltageLimit => &mut self.set_voltage,
                    RegisterAddress::IsOn | RegisterAddress::Time | RegisterAddress::Timer => {
                        return Err(Error::InvalidParameter(format!(
                            "{register} cannot hold {value:?}"
                        )));
                    }
                };
                *slot = v;
            }
        }
        Ok(())
    }

    /// All registers as `(register, value)` pairs in wire-code order.
    pub fn values(&self) -> impl Iterator<Item = (RegisterAddress, Value)> + '_ {
        RegisterAddress::ALL.iter().map(|r| (*r, self.get(*r)))
    }

    /// Output power in watts.
    pub fn power(&self) -> f64 {
        self.voltage * self.current
    }
}
