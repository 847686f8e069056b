//! Virtual I2C bus with register-addressable targets.
//!
//! Every target models the common register-file protocol: the first written
//! byte sets a register pointer, further written bytes land at the pointer
//! with auto-increment, and reads stream from the pointer onward. This is
//! the protocol whose correctness depends on `write_read` keeping bus
//! ownership between the phases.
//!
//! In interloper mode the bus simulates a second controller that grabs the
//! bus at every release and resets each target's pointer. A naive `write`
//! then `read` composition then observably reads the wrong register, while
//! `write_read` still reads the right one.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::config::VirtI2cConfig;
use crate::error::{Error, Result};
use crate::hw_trait::I2c;
use crate::registry::Registry;
use crate::tracing::prelude::*;

struct Target {
    regs: [u8; 256],
    pointer: u8,
}

impl Target {
    fn new() -> Self {
        Self {
            regs: [0; 256],
            pointer: 0,
        }
    }

    fn write(&mut self, data: &[u8]) {
        let Some((&reg, rest)) = data.split_first() else {
            // Address probe, nothing to transfer.
            return;
        };
        self.pointer = reg;
        for &byte in rest {
            self.regs[self.pointer as usize] = byte;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read(&mut self, buff: &mut [u8]) {
        for slot in buff.iter_mut() {
            *slot = self.regs[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

struct Device {
    dev: u32,
}

/// In-memory I2C bank sharing one set of targets across its buses.
pub struct VirtI2c {
    devs: u32,
    interloper: bool,
    targets: HashMap<u16, Target>,
    open: HashSet<u32>,
    registry: Registry<Device>,
}

impl VirtI2c {
    pub fn new(config: &VirtI2cConfig) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|&addr| (addr, Target::new()))
            .collect();
        Self {
            devs: config.devs,
            interloper: config.interloper,
            targets,
            open: HashSet::new(),
            registry: Registry::with_capacity(config.devs as usize),
        }
    }

    /// Preload one register of a target. Test fixture surface.
    pub fn load_register(&mut self, addr: u16, reg: u8, value: u8) {
        if let Some(target) = self.targets.get_mut(&addr) {
            target.regs[reg as usize] = value;
        }
    }

    /// The simulated second controller: runs at every bus release.
    fn release_bus(&mut self) {
        if self.interloper {
            for target in self.targets.values_mut() {
                target.pointer = 0;
            }
        }
    }
}

fn pin_ok(pin: i32) -> bool {
    pin >= -1
}

#[async_trait]
impl I2c for VirtI2c {
    async fn init(&mut self, dev: u32, baud: u32, sda: i32, scl: i32) -> Result<i32> {
        if dev >= self.devs || baud == 0 || !pin_ok(sda) || !pin_ok(scl) {
            debug!(dev, baud, sda, scl, "Rejecting I2C configuration.");
            return Err(Error::InvalidConfig);
        }
        if self.open.contains(&dev) {
            return Err(Error::ResourceExhausted);
        }

        let handle = self.registry.insert(Device { dev })?;
        self.open.insert(dev);
        trace!(dev, baud, handle, "I2C initialized.");
        Ok(handle)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        let device = self.registry.remove(handle)?;
        self.open.remove(&device.dev);
        trace!(dev = device.dev, handle, "I2C released.");
        Ok(())
    }

    async fn write(&mut self, handle: i32, addr: u16, data: &[u8]) -> Result<()> {
        self.registry.get(handle)?;
        let target = self.targets.get_mut(&addr).ok_or(Error::NoAck)?;
        target.write(data);
        self.release_bus();
        Ok(())
    }

    async fn read(&mut self, handle: i32, addr: u16, buff: &mut [u8]) -> Result<()> {
        self.registry.get(handle)?;
        let target = self.targets.get_mut(&addr).ok_or(Error::NoAck)?;
        target.read(buff);
        self.release_bus();
        Ok(())
    }

    async fn write_read(
        &mut self,
        handle: i32,
        addr: u16,
        data: &[u8],
        buff: &mut [u8],
    ) -> Result<()> {
        self.registry.get(handle)?;
        let target = self.targets.get_mut(&addr).ok_or(Error::NoAck)?;
        // Repeated START between the phases: the bus is released only after
        // both complete.
        target.write(data);
        target.read(buff);
        self.release_bus();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: u16 = 0x24;

    async fn i2c(interloper: bool) -> (VirtI2c, i32) {
        let config = VirtI2cConfig {
            interloper,
            ..VirtI2cConfig::default()
        };
        let mut i2c = VirtI2c::new(&config);
        let handle = i2c.init(0, 100_000, -1, -1).await.unwrap();
        (i2c, handle)
    }

    #[tokio::test]
    async fn write_read_fetches_addressed_register() {
        let (mut i2c, handle) = i2c(false).await;
        i2c.load_register(TARGET, 0x10, 0xab);

        let mut value = [0u8; 1];
        i2c.write_read(handle, TARGET, &[0x10], &mut value).await.unwrap();
        assert_eq!(value, [0xab]);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_registers() {
        let (mut i2c, handle) = i2c(false).await;

        i2c.write(handle, TARGET, &[0x20, 1, 2, 3]).await.unwrap();

        let mut values = [0u8; 3];
        i2c.write_read(handle, TARGET, &[0x20], &mut values).await.unwrap();
        assert_eq!(values, [1, 2, 3]);
    }

    #[tokio::test]
    async fn absent_target_does_not_ack() {
        let (mut i2c, handle) = i2c(false).await;
        let mut buff = [0u8; 1];

        assert_eq!(i2c.write(handle, 0x7f, &[0]).await, Err(Error::NoAck));
        assert_eq!(i2c.read(handle, 0x7f, &mut buff).await, Err(Error::NoAck));
        assert_eq!(
            i2c.write_read(handle, 0x7f, &[0], &mut buff).await,
            Err(Error::NoAck)
        );
    }

    #[tokio::test]
    async fn write_read_is_atomic_against_interloper() {
        let (mut i2c, handle) = i2c(true).await;
        i2c.load_register(TARGET, 0x05, 0xcd);
        i2c.load_register(TARGET, 0x00, 0x11);

        // Atomic form: register pointer survives to the read phase.
        let mut atomic = [0u8; 1];
        i2c.write_read(handle, TARGET, &[0x05], &mut atomic).await.unwrap();
        assert_eq!(atomic, [0xcd]);

        // Naive composition: the interloper resets the pointer between the
        // transactions, so the read streams from register 0 instead.
        let mut naive = [0u8; 1];
        i2c.write(handle, TARGET, &[0x05]).await.unwrap();
        i2c.read(handle, TARGET, &mut naive).await.unwrap();
        assert_eq!(naive, [0x11]);
    }

    #[tokio::test]
    async fn empty_write_is_an_address_probe() {
        let (mut i2c, handle) = i2c(false).await;
        assert_eq!(i2c.write(handle, TARGET, &[]).await, Ok(()));
        assert_eq!(i2c.write(handle, 0x7f, &[]).await, Err(Error::NoAck));
    }

    #[tokio::test]
    async fn pointer_auto_increment_wraps() {
        let (mut i2c, handle) = i2c(false).await;
        i2c.load_register(TARGET, 0xff, 0x01);
        i2c.load_register(TARGET, 0x00, 0x02);

        let mut values = [0u8; 2];
        i2c.write_read(handle, TARGET, &[0xff], &mut values).await.unwrap();
        assert_eq!(values, [0x01, 0x02]);
    }

    #[tokio::test]
    async fn stale_handle_is_rejected() {
        let (mut i2c, handle) = i2c(false).await;
        i2c.deinit(handle).await.unwrap();

        let mut buff = [0u8; 1];
        assert_eq!(i2c.deinit(handle).await, Err(Error::InvalidHandle));
        assert_eq!(i2c.write(handle, TARGET, &[0]).await, Err(Error::InvalidHandle));
        assert_eq!(
            i2c.write_read(handle, TARGET, &[0], &mut buff).await,
            Err(Error::InvalidHandle)
        );
    }

    #[tokio::test]
    async fn busy_bus_is_exhausted() {
        let (mut i2c, _handle) = i2c(false).await;
        assert_eq!(i2c.init(0, 100_000, -1, -1).await, Err(Error::ResourceExhausted));
    }
}
