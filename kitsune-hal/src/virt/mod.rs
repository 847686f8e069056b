//! Virtual platform: pure in-memory peripheral drivers.
//!
//! These drivers model just enough hardware behavior to exercise the full
//! capability contract: a GPIO bank with loopback pins, a UART with a finite
//! TX FIFO and bounded blocking reads, an SPI loopback bus, and an I2C bus
//! populated with register-addressable targets. The daemon uses them as its
//! default platform; the test suite uses them as its contract fixture.

mod gpio;
mod i2c;
mod spi;
mod uart;

pub use gpio::VirtGpio;
pub use i2c::VirtI2c;
pub use spi::VirtSpi;
pub use uart::VirtUart;

use async_trait::async_trait;

use crate::config::{Config, VirtConfig};
use crate::platform::{Platform, PlatformDescriptor};
use crate::table::DriverTable;

/// Assemble a driver table of virtual devices with the given shape.
pub fn table(config: &VirtConfig) -> DriverTable {
    DriverTable::builder()
        .gpio(VirtGpio::new(&config.gpio))
        .uart(VirtUart::new(&config.uart))
        .spi(VirtSpi::new(&config.spi))
        .i2c(VirtI2c::new(&config.i2c))
        .build()
}

struct VirtPlatform;

#[async_trait]
impl Platform for VirtPlatform {
    async fn open(&self, config: &Config) -> anyhow::Result<DriverTable> {
        Ok(table(&config.virt))
    }
}

inventory::submit! {
    PlatformDescriptor {
        name: "virt",
        build: || Box::new(VirtPlatform),
    }
}
