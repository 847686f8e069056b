//! UART capability contract.

use async_trait::async_trait;

use super::UartFlags;
use crate::error::{Error, Result};

/// Platform UART abstraction.
#[async_trait]
pub trait Uart: Send {
    /// Configure a UART device and baud rate, returning a handle.
    ///
    /// `tx`/`rx` select pin-mux routings where several physical wirings
    /// exist; `-1` means "use the default wiring for this dev".
    async fn init(&mut self, dev: u32, baud: u32, tx: i32, rx: i32) -> Result<i32>;

    /// Release a device by handle.
    async fn deinit(&mut self, handle: i32) -> Result<()>;

    /// Transmit bytes, returning the count actually written.
    ///
    /// Partial writes are a valid outcome and are reported through the
    /// count, never silently truncated.
    async fn write(&mut self, handle: i32, flags: UartFlags, data: &[u8]) -> Result<usize>;

    /// Receive bytes, returning the count actually read.
    ///
    /// A non-blocking read of an idle line returns `Ok(0)`. A bounded
    /// blocking read that sees no data in time fails with `Timeout`.
    async fn read(&mut self, handle: i32, flags: UartFlags, buff: &mut [u8]) -> Result<usize>;
}

/// Blanket implementation of Uart for mutable references to Uart
#[async_trait]
impl<T: Uart + ?Sized> Uart for &mut T {
    async fn init(&mut self, dev: u32, baud: u32, tx: i32, rx: i32) -> Result<i32> {
        (**self).init(dev, baud, tx, rx).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn write(&mut self, handle: i32, flags: UartFlags, data: &[u8]) -> Result<usize> {
        (**self).write(handle, flags, data).await
    }

    async fn read(&mut self, handle: i32, flags: UartFlags, buff: &mut [u8]) -> Result<usize> {
        (**self).read(handle, flags, buff).await
    }
}

/// Blanket implementation of Uart for boxed Uart types
#[async_trait]
impl<T: Uart + ?Sized> Uart for Box<T> {
    async fn init(&mut self, dev: u32, baud: u32, tx: i32, rx: i32) -> Result<i32> {
        (**self).init(dev, baud, tx, rx).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn write(&mut self, handle: i32, flags: UartFlags, data: &[u8]) -> Result<usize> {
        (**self).write(handle, flags, data).await
    }

    async fn read(&mut self, handle: i32, flags: UartFlags, buff: &mut [u8]) -> Result<usize> {
        (**self).read(handle, flags, buff).await
    }
}

/// Null UART implementation for platforms without the class.
pub struct NullUart;

#[async_trait]
impl Uart for NullUart {
    async fn init(&mut self, _dev: u32, _baud: u32, _tx: i32, _rx: i32) -> Result<i32> {
        Err(Error::Unsupported)
    }

    async fn deinit(&mut self, _handle: i32) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn write(&mut self, _handle: i32, _flags: UartFlags, _data: &[u8]) -> Result<usize> {
        Err(Error::Unsupported)
    }

    async fn read(&mut self, _handle: i32, _flags: UartFlags, _buff: &mut [u8]) -> Result<usize> {
        Err(Error::Unsupported)
    }
}
