//! Virtual GPIO bank.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::config::VirtGpioConfig;
use crate::error::{Error, Result};
use crate::hw_trait::{Gpio, Level, PinMode};
use crate::registry::Registry;
use crate::tracing::prelude::*;

struct Pin {
    port: i32,
    pin: i32,
    mode: PinMode,
    level: Level,
}

/// In-memory GPIO bank of `ports` x `pins` pins.
///
/// A pin configured with both INPUT and OUTPUT behaves as loopback: `get`
/// observes the last driven level. Before any `set`, the level follows the
/// pull configuration.
pub struct VirtGpio {
    ports: i32,
    pins: i32,
    claimed: HashSet<(i32, i32)>,
    registry: Registry<Pin>,
}

impl VirtGpio {
    pub fn new(config: &VirtGpioConfig) -> Self {
        let capacity = (config.ports * config.pins) as usize;
        Self {
            ports: config.ports as i32,
            pins: config.pins as i32,
            claimed: HashSet::new(),
            registry: Registry::with_capacity(capacity),
        }
    }
}

#[async_trait]
impl Gpio for VirtGpio {
    async fn init(&mut self, port: i32, pin: i32, mode: PinMode) -> Result<i32> {
        if !(0..self.ports).contains(&port) || !(0..self.pins).contains(&pin) {
            debug!(port, pin, "Rejecting out-of-range pin.");
            return Err(Error::InvalidConfig);
        }
        if !mode.is_valid() {
            debug!(port, pin, ?mode, "Rejecting pin mode.");
            return Err(Error::InvalidConfig);
        }
        if self.claimed.contains(&(port, pin)) {
            return Err(Error::ResourceExhausted);
        }

        let level = if mode.contains(PinMode::PULL_UP) {
            Level::High
        } else {
            Level::Low
        };
        let handle = self.registry.insert(Pin {
            port,
            pin,
            mode,
            level,
        })?;
        self.claimed.insert((port, pin));
        trace!(port, pin, handle, "Pin initialized.");
        Ok(handle)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        let pin = self.registry.remove(handle)?;
        self.claimed.remove(&(pin.port, pin.pin));
        trace!(port = pin.port, pin = pin.pin, handle, "Pin released.");
        Ok(())
    }

    async fn set(&mut self, handle: i32, level: Level) -> Result<()> {
        let pin = self.registry.get_mut(handle)?;
        if !pin.mode.contains(PinMode::OUTPUT) {
            return Err(Error::Io);
        }
        pin.level = level;
        Ok(())
    }

    async fn get(&mut self, handle: i32) -> Result<Level> {
        Ok(self.registry.get(handle)?.level)
    }
}
