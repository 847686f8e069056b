//! Virtual SPI bus with loopback wiring (MOSI tied to MISO).

use async_trait::async_trait;
use std::collections::HashSet;

use crate::config::VirtSpiConfig;
use crate::error::{Error, Result};
use crate::hw_trait::Spi;
use crate::registry::Registry;
use crate::tracing::prelude::*;

struct Device {
    dev: u32,
}

/// In-memory SPI bank where every device receives exactly what it transmits.
///
/// `read` clocks the bus while driving the configured idle fill, so the
/// loopback hands that fill pattern back. Transfers beyond `max_transfer`
/// bytes are rejected with `InvalidConfig` before touching the bus.
pub struct VirtSpi {
    devs: u32,
    max_transfer: usize,
    idle_fill: u8,
    open: HashSet<u32>,
    registry: Registry<Device>,
}

impl VirtSpi {
    pub fn new(config: &VirtSpiConfig) -> Self {
        Self {
            devs: config.devs,
            max_transfer: config.max_transfer,
            idle_fill: config.idle_fill,
            open: HashSet::new(),
            registry: Registry::with_capacity(config.devs as usize),
        }
    }

    fn check_transfer(&self, len: usize) -> Result<()> {
        if len > self.max_transfer {
            debug!(len, max = self.max_transfer, "Rejecting oversize transfer.");
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

fn pin_ok(pin: i32) -> bool {
    pin >= -1
}

#[async_trait]
impl Spi for VirtSpi {
    async fn init(
        &mut self,
        dev: u32,
        baud: u32,
        mosi: i32,
        miso: i32,
        sck: i32,
        cs: i32,
    ) -> Result<i32> {
        if dev >= self.devs
            || baud == 0
            || !pin_ok(mosi)
            || !pin_ok(miso)
            || !pin_ok(sck)
            || !pin_ok(cs)
        {
            debug!(dev, baud, mosi, miso, sck, cs, "Rejecting SPI configuration.");
            return Err(Error::InvalidConfig);
        }
        if self.open.contains(&dev) {
            return Err(Error::ResourceExhausted);
        }

        let handle = self.registry.insert(Device { dev })?;
        self.open.insert(dev);
        trace!(dev, baud, handle, "SPI initialized.");
        Ok(handle)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        let device = self.registry.remove(handle)?;
        self.open.remove(&device.dev);
        trace!(dev = device.dev, handle, "SPI released.");
        Ok(())
    }

    async fn read(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        self.registry.get(handle)?;
        data.fill(self.idle_fill);
        Ok(())
    }

    async fn write(&mut self, handle: i32, data: &[u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        self.registry.get(handle)?;
        Ok(())
    }

    async fn transfer(&mut self, handle: i32, read: &mut [u8], write: &[u8]) -> Result<()> {
        if read.len() != write.len() {
            return Err(Error::InvalidConfig);
        }
        self.check_transfer(write.len())?;
        self.registry.get(handle)?;
        read.copy_from_slice(write);
        Ok(())
    }

    async fn transfer_inplace(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        self.registry.get(handle)?;
        // Loopback: received bytes are the transmitted bytes.
        Ok(())
    }
}
