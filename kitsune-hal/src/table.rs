//! Driver table: the per-platform aggregate of peripheral drivers.
//!
//! A table is built once at startup and never mutated afterward; there is no
//! way to swap a driver out of a built table. That absence of mutation is
//! what lets a host share one table across every guest call without
//! synchronizing table reads (calls themselves are serialized by the owner).

use crate::hw_trait::{Gpio, I2c, NullGpio, NullI2c, NullSpi, NullUart, Spi, Uart};

/// Immutable aggregate of the four peripheral class drivers.
pub struct DriverTable {
    gpio: Box<dyn Gpio>,
    uart: Box<dyn Uart>,
    spi: Box<dyn Spi>,
    i2c: Box<dyn I2c>,
}

impl DriverTable {
    /// Begin building a table. Classes left uninstalled answer every
    /// operation with `Unsupported`.
    pub fn builder() -> DriverTableBuilder {
        DriverTableBuilder {
            gpio: Box::new(NullGpio),
            uart: Box::new(NullUart),
            spi: Box::new(NullSpi),
            i2c: Box::new(NullI2c),
        }
    }

    pub fn gpio(&mut self) -> &mut dyn Gpio {
        &mut *self.gpio
    }

    pub fn uart(&mut self) -> &mut dyn Uart {
        &mut *self.uart
    }

    pub fn spi(&mut self) -> &mut dyn Spi {
        &mut *self.spi
    }

    pub fn i2c(&mut self) -> &mut dyn I2c {
        &mut *self.i2c
    }
}

/// Builder for [`DriverTable`]; the only point where drivers are installed.
pub struct DriverTableBuilder {
    gpio: Box<dyn Gpio>,
    uart: Box<dyn Uart>,
    spi: Box<dyn Spi>,
    i2c: Box<dyn I2c>,
}

impl DriverTableBuilder {
    pub fn gpio(mut self, driver: impl Gpio + 'static) -> Self {
        self.gpio = Box::new(driver);
        self
    }

    pub fn uart(mut self, driver: impl Uart + 'static) -> Self {
        self.uart = Box::new(driver);
        self
    }

    pub fn spi(mut self, driver: impl Spi + 'static) -> Self {
        self.spi = Box::new(driver);
        self
    }

    pub fn i2c(mut self, driver: impl I2c + 'static) -> Self {
        self.i2c = Box::new(driver);
        self
    }

    /// Freeze the table.
    pub fn build(self) -> DriverTable {
        DriverTable {
            gpio: self.gpio,
            uart: self.uart,
            spi: self.spi,
            i2c: self.i2c,
        }
    }
}
