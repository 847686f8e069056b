//! I2C capability contract.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Platform I2C abstraction.
///
/// Target addresses are `u16` to cover both 7- and 10-bit addressing modes.
#[async_trait]
pub trait I2c: Send {
    /// Configure an I2C bus and baud rate, returning a handle.
    ///
    /// `-1` on a pin parameter means "use the default wiring for this dev".
    async fn init(&mut self, dev: u32, baud: u32, sda: i32, scl: i32) -> Result<i32>;

    /// Release a bus by handle.
    async fn deinit(&mut self, handle: i32) -> Result<()>;

    /// Address a target and write `data`.
    ///
    /// Fails with `NoAck` if the target does not acknowledge.
    async fn write(&mut self, handle: i32, addr: u16, data: &[u8]) -> Result<()>;

    /// Address a target and read `buff.len()` bytes.
    async fn read(&mut self, handle: i32, addr: u16, buff: &mut [u8]) -> Result<()>;

    /// Write then read without releasing the bus between the phases.
    ///
    /// The read phase follows a repeated START, never a STOP, so no other
    /// bus controller can interleave. This is what register-pointer-then-read
    /// device protocols require; a `write()` followed by a `read()` is not
    /// equivalent.
    async fn write_read(
        &mut self,
        handle: i32,
        addr: u16,
        data: &[u8],
        buff: &mut [u8],
    ) -> Result<()>;
}

/// Blanket implementation of I2c for mutable references to I2c
#[async_trait]
impl<T: I2c + ?Sized> I2c for &mut T {
    async fn init(&mut self, dev: u32, baud: u32, sda: i32, scl: i32) -> Result<i32> {
        (**self).init(dev, baud, sda, scl).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn write(&mut self, handle: i32, addr: u16, data: &[u8]) -> Result<()> {
        (**self).write(handle, addr, data).await
    }

    async fn read(&mut self, handle: i32, addr: u16, buff: &mut [u8]) -> Result<()> {
        (**self).read(handle, addr, buff).await
    }

    async fn write_read(
        &mut self,
        handle: i32,
        addr: u16,
        data: &[u8],
        buff: &mut [u8],
    ) -> Result<()> {
        (**self).write_read(handle, addr, data, buff).await
    }
}

/// Blanket implementation of I2c for boxed I2c types
#[async_trait]
impl<T: I2c + ?Sized> I2c for Box<T> {
    async fn init(&mut self, dev: u32, baud: u32, sda: i32, scl: i32) -> Result<i32> {
        (**self).init(dev, baud, sda, scl).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn write(&mut self, handle: i32, addr: u16, data: &[u8]) -> Result<()> {
        (**self).write(handle, addr, data).await
    }

    async fn read(&mut self, handle: i32, addr: u16, buff: &mut [u8]) -> Result<()> {
        (**self).read(handle, addr, buff).await
    }

    async fn write_read(
        &mut self,
        handle: i32,
        addr: u16,
        data: &[u8],
        buff: &mut [u8],
    ) -> Result<()> {
        (**self).write_read(handle, addr, data, buff).await
    }
}

/// Null I2C implementation for platforms without the class.
pub struct NullI2c;

#[async_trait]
impl I2c for NullI2c {
    async fn init(&mut self, _dev: u32, _baud: u32, _sda: i32, _scl: i32) -> Result<i32> {
        Err(Error::Unsupported)
    }

    async fn deinit(&mut self, _handle: i32) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn write(&mut self, _handle: i32, _addr: u16, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn read(&mut self, _handle: i32, _addr: u16, _buff: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn write_read(
        &mut self,
        _handle: i32,
        _addr: u16,
        _data: &[u8],
        _buff: &mut [u8],
    ) -> Result<()> {
        Err(Error::Unsupported)
    }
}
