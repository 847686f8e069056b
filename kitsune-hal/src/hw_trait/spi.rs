//! SPI capability contract.
//!
//! This trait is the unification of two historical interface generations: a
//! minimal init/deinit/write/transfer/exec table and an extended one with an
//! explicit `read` plus both two-buffer and in-place `transfer` variants.
//! The extended superset is what implementations provide; `exec` is carried
//! as a reserved stub because neither generation ever defined its semantics.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Platform SPI abstraction.
#[async_trait]
pub trait Spi: Send {
    /// Configure an SPI device, returning a handle.
    ///
    /// `-1` on any pin parameter means "use the device's default wiring".
    async fn init(
        &mut self,
        dev: u32,
        baud: u32,
        mosi: i32,
        miso: i32,
        sck: i32,
        cs: i32,
    ) -> Result<i32>;

    /// Release a device by handle.
    async fn deinit(&mut self, handle: i32) -> Result<()>;

    /// Clock in `data.len()` bytes while driving MOSI with the platform's
    /// idle pattern, storing the received bytes.
    async fn read(&mut self, handle: i32, data: &mut [u8]) -> Result<()>;

    /// Clock out `data`, discarding received bytes.
    async fn write(&mut self, handle: i32, data: &[u8]) -> Result<()>;

    /// Full-duplex exchange over two equal-length buffers.
    ///
    /// Mismatched lengths fail with `InvalidConfig`.
    async fn transfer(&mut self, handle: i32, read: &mut [u8], write: &[u8]) -> Result<()>;

    /// Full-duplex exchange that overwrites the transmit buffer with the
    /// received bytes. The zero-copy fast path on hardware whose FIFO shifts
    /// out and in through the same register.
    async fn transfer_inplace(&mut self, handle: i32, data: &mut [u8]) -> Result<()>;

    /// Reserved write-then-read sequencing primitive.
    ///
    /// No contract has been defined for this operation yet. It reports
    /// `Unsupported`; implementations must not invent semantics for it.
    async fn exec(&mut self, handle: i32) -> Result<()> {
        let _ = handle;
        Err(Error::Unsupported)
    }
}

/// Blanket implementation of Spi for mutable references to Spi
#[async_trait]
impl<T: Spi + ?Sized> Spi for &mut T {
    async fn init(
        &mut self,
        dev: u32,
        baud: u32,
        mosi: i32,
        miso: i32,
        sck: i32,
        cs: i32,
    ) -> Result<i32> {
        (**self).init(dev, baud, mosi, miso, sck, cs).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn read(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        (**self).read(handle, data).await
    }

    async fn write(&mut self, handle: i32, data: &[u8]) -> Result<()> {
        (**self).write(handle, data).await
    }

    async fn transfer(&mut self, handle: i32, read: &mut [u8], write: &[u8]) -> Result<()> {
        (**self).transfer(handle, read, write).await
    }

    async fn transfer_inplace(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        (**self).transfer_inplace(handle, data).await
    }

    async fn exec(&mut self, handle: i32) -> Result<()> {
        (**self).exec(handle).await
    }
}

/// Blanket implementation of Spi for boxed Spi types
#[async_trait]
impl<T: Spi + ?Sized> Spi for Box<T> {
    async fn init(
        &mut self,
        dev: u32,
        baud: u32,
        mosi: i32,
        miso: i32,
        sck: i32,
        cs: i32,
    ) -> Result<i32> {
        (**self).init(dev, baud, mosi, miso, sck, cs).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn read(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        (**self).read(handle, data).await
    }

    async fn write(&mut self, handle: i32, data: &[u8]) -> Result<()> {
        (**self).write(handle, data).await
    }

    async fn transfer(&mut self, handle: i32, read: &mut [u8], write: &[u8]) -> Result<()> {
        (**self).transfer(handle, read, write).await
    }

    async fn transfer_inplace(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        (**self).transfer_inplace(handle, data).await
    }

    async fn exec(&mut self, handle: i32) -> Result<()> {
        (**self).exec(handle).await
    }
}

/// Null SPI implementation for platforms without the class.
pub struct NullSpi;

#[async_trait]
impl Spi for NullSpi {
    async fn init(
        &mut self,
        _dev: u32,
        _baud: u32,
        _mosi: i32,
        _miso: i32,
        _sck: i32,
        _cs: i32,
    ) -> Result<i32> {
        Err(Error::Unsupported)
    }

    async fn deinit(&mut self, _handle: i32) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn read(&mut self, _handle: i32, _data: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn write(&mut self, _handle: i32, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn transfer(&mut self, _handle: i32, _read: &mut [u8], _write: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn transfer_inplace(&mut self, _handle: i32, _data: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported)
    }
}
