//! A simulated PX100 behind a [`MockTransport`].
//!
//! [`SimulatedPx100`] answers frames the way the instrument does: reads
//! return the 7-byte register response, writes update the setpoints and
//! are acknowledged with `0x6F`. Failure switches make it go silent,
//! reject writes, or accept writes without applying them.
//!
//! While the output is on, every read of the on/off register advances a
//! small discharge model by [`seconds_per_poll`](SimulatedPx100::set_seconds_per_poll)
//! (zero by default, so tests see static values).
//!
//! # Example
//!
//! ```
//! use px100_test_harness::SimulatedPx100;
//!
//! let device = SimulatedPx100::new();
//! let transport = device.transport();
//! device.set_silent(true);
//! # drop(transport);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use crate::mock_serial::MockTransport;

const REQUEST_HEADER: [u8; 2] = [0xB1, 0xB2];
const REQUEST_TRAILER: u8 = 0xB6;
const ACK: u8 = 0x6F;
const NAK: u8 = 0x00;

#[derive(Debug)]
struct State {
    on: bool,
    voltage_mv: f64,
    elapsed_s: f64,
    cap_mah: f64,
    cap_mwh: f64,
    temp_c: u32,
    /// Current setpoint in 1/100 A.
    set_current: u32,
    /// Cut-off voltage in 1/100 V.
    set_voltage: u32,
    timer_s: u32,
    silent: bool,
    reject_writes: bool,
    ignore_writes: bool,
    seconds_per_poll: f64,
}

impl Default for State {
    fn default() -> Self {
        State {
            on: false,
            voltage_mv: 12_000.0,
            elapsed_s: 0.0,
            cap_mah: 0.0,
            cap_mwh: 0.0,
            temp_c: 25,
            set_current: 150,
            set_voltage: 1_000,
            timer_s: 0,
            silent: false,
            reject_writes: false,
            ignore_writes: false,
            seconds_per_poll: 0.0,
        }
    }
}

fn hms(total: u32) -> [u8; 3] {
    let h = (total / 3600).min(u32::from(u8::MAX));
    [h as u8, ((total / 60) % 60) as u8, (total % 60) as u8]
}

fn raw(value: u32) -> [u8; 3] {
    let [_, a, b, c] = value.min(0x00FF_FFFF).to_be_bytes();
    [a, b, c]
}

impl State {
    fn current_ma(&self) -> u32 {
        if self.on {
            self.set_current * 10
        } else {
            0
        }
    }

    fn advance(&mut self, dt: f64) {
        if !self.on || dt <= 0.0 {
            return;
        }
        let current_ma = f64::from(self.current_ma());
        self.elapsed_s += dt;
        self.cap_mah += current_ma * dt / 3600.0;
        self.cap_mwh += current_ma * self.voltage_mv / 1000.0 * dt / 3600.0;
        self.voltage_mv = (self.voltage_mv - current_ma * dt / 1000.0).max(0.0);

        let cutoff_mv = f64::from(self.set_voltage) * 10.0;
        let timer_done = self.timer_s > 0 && self.elapsed_s >= f64::from(self.timer_s);
        if self.voltage_mv <= cutoff_mv || timer_done {
            self.on = false;
        }
    }

    fn read(&mut self, code: u8) -> Option<[u8; 3]> {
        let payload = match code {
            0x10 => {
                let dt = self.seconds_per_poll;
                self.advance(dt);
                raw(u32::from(self.on))
            }
            0x11 => raw(self.voltage_mv.round() as u32),
            0x12 => raw(self.current_ma()),
            0x13 => hms(self.elapsed_s as u32),
            0x14 => raw(self.cap_mah.round() as u32),
            0x15 => raw(self.cap_mwh.round() as u32),
            0x16 => raw(self.temp_c),
            0x17 => raw(self.set_current),
            0x18 => raw(self.set_voltage),
            0x19 => hms(self.timer_s),
            _ => return None,
        };
        Some(payload)
    }

    fn write(&mut self, code: u8, payload: [u8; 2]) -> bool {
        let hundredths = u32::from(payload[0]) * 100 + u32::from(payload[1]);
        match code {
            0x01 => self.on = payload == [0x01, 0x00],
            0x02 => self.set_current = hundredths,
            0x03 => self.set_voltage = hundredths,
            0x04 => self.timer_s = u32::from(u16::from_be_bytes(payload)),
            0x05 => {
                self.cap_mah = 0.0;
                self.cap_mwh = 0.0;
                self.elapsed_s = 0.0;
            }
            _ => return false,
        }
        true
    }

    fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        if self.silent
            || request.len() != 6
            || request[..2] != REQUEST_HEADER
            || request[5] != REQUEST_TRAILER
        {
            return Vec::new();
        }
        let code = request[2];
        let payload = [request[3], request[4]];

        if code >= 0x10 {
            return match self.read(code) {
                Some([a, b, c]) => vec![0xCA, 0xCB, a, b, c, 0xCE, 0xCF],
                None => Vec::new(),
            };
        }

        if self.reject_writes {
            return vec![NAK];
        }
        if self.ignore_writes {
            return vec![ACK];
        }
        if self.write(code, payload) {
            vec![ACK]
        } else {
            vec![NAK]
        }
    }
}

/// Shared handle to a simulated instrument.
///
/// Clones control the same instrument, so a test can keep a handle after
/// the transport has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPx100 {
    state: Arc<Mutex<State>>,
}

impl SimulatedPx100 {
    /// An idle instrument: output off, 12 V on the terminals, 1.5 A and
    /// 10 V setpoints, no timer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A transport wired to this instrument, reporting endpoint `"sim"`.
    pub fn transport(&self) -> MockTransport {
        self.transport_on("sim")
    }

    /// A transport wired to this instrument with the given endpoint name.
    pub fn transport_on(&self, endpoint: &str) -> MockTransport {
        let device = self.clone();
        MockTransport::with_responder(move |request| device.respond(request))
            .with_endpoint(endpoint)
    }

    /// Answer one request frame.
    pub fn respond(&self, request: &[u8]) -> Vec<u8> {
        self.lock().respond(request)
    }

    /// Stop answering anything.
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Answer every write with a non-ACK byte.
    pub fn set_reject_writes(&self, reject: bool) {
        self.lock().reject_writes = reject;
    }

    /// Acknowledge writes but leave the setpoints unchanged.
    pub fn set_ignore_writes(&self, ignore: bool) {
        self.lock().ignore_writes = ignore;
    }

    /// Simulated discharge time per poll cycle while the output is on.
    pub fn set_seconds_per_poll(&self, seconds: f64) {
        self.lock().seconds_per_poll = seconds;
    }

    /// Elapsed discharge time reported by the time register.
    pub fn set_elapsed_seconds(&self, seconds: u32) {
        self.lock().elapsed_s = f64::from(seconds);
    }

    /// Terminal voltage of the simulated battery.
    pub fn set_terminal_voltage(&self, volts: f64) {
        self.lock().voltage_mv = volts * 1000.0;
    }

    /// Whether the load is sinking current.
    pub fn output_on(&self) -> bool {
        self.lock().on
    }

    /// Current setpoint in amperes.
    pub fn current_limit(&self) -> f64 {
        f64::from(self.lock().set_current) / 100.0
    }

    /// Cut-off voltage setpoint in volts.
    pub fn voltage_limit(&self) -> f64 {
        f64::from(self.lock().set_voltage) / 100.0
    }

    /// Timer setpoint in seconds.
    pub fn timer_seconds(&self) -> u32 {
        self.lock().timer_s
    }
}
