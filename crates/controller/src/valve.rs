//! Valve control via GPIO. The `gpio` feature gates the real rppal driver;
//! without it, a mock implementation tracks state in memory and logs
//! transitions. Valves are addressed by position: valve id N drives the
//! N-th configured pin.

use anyhow::Result;
use tracing::warn;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Real GPIO valve board (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct ValveBoard {
    pins: Vec<OutputPin>, // indexed by valve position
    active_low: bool,     // many relay boards are active-low
}

#[cfg(feature = "gpio")]
impl ValveBoard {
    pub fn new(pin_numbers: &[u8], active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut pins = Vec::with_capacity(pin_numbers.len());

        for pin_num in pin_numbers {
            let mut pin = gpio.get(*pin_num)?.into_output();

            // Fail-safe: ensure OFF at startup.
            if active_low {
                pin.set_high();
            } else {
                pin.set_low();
            }

            pins.push(pin);
        }

        Ok(Self { pins, active_low })
    }

    pub fn set(&mut self, valve_id: u32, on: bool) {
        let Some(pin) = self.pins.get_mut(valve_id as usize) else {
            warn!(valve = valve_id, "unknown valve id");
            return;
        };
        let high = on != self.active_low;
        if high {
            pin.set_high();
        } else {
            pin.set_low();
        }
        tracing::debug!(valve = valve_id, on, "valve set");
    }

    pub fn all_off(&mut self) {
        for id in 0..self.pins.len() {
            self.set(id as u32, false);
        }
    }
}

// ---------------------------------------------------------------------------
// Mock valve board (development — no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct ValveBoard {
    states: Vec<std::sync::Arc<std::sync::atomic::AtomicBool>>,
}

#[cfg(not(feature = "gpio"))]
impl ValveBoard {
    pub fn new(pin_numbers: &[u8], _active_low: bool) -> Result<Self> {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let states = pin_numbers
            .iter()
            .enumerate()
            .map(|(id, pin)| {
                tracing::debug!(valve = id, gpio = pin, "mock valve registered (not wired)");
                Arc::new(AtomicBool::new(false))
            })
            .collect();
        Ok(Self { states })
    }

    pub fn set(&mut self, valve_id: u32, on: bool) {
        use std::sync::atomic::Ordering;

        let Some(state) = self.states.get(valve_id as usize) else {
            warn!(valve = valve_id, "unknown valve id");
            return;
        };
        state.store(on, Ordering::SeqCst);
        tracing::debug!(valve = valve_id, on, "mock valve set");
    }

    pub fn all_off(&mut self) {
        for id in 0..self.states.len() {
            self.set(id as u32, false);
        }
    }

    /// Handle onto a valve's state, readable after the board has been
    /// moved into the executor task.
    pub fn watch(&self, valve_id: u32) -> Option<std::sync::Arc<std::sync::atomic::AtomicBool>> {
        self.states.get(valve_id as usize).cloned()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
