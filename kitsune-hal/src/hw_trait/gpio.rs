//! GPIO capability contract.

use async_trait::async_trait;

use super::{Level, PinMode};
use crate::error::{Error, Result};

/// Platform GPIO abstraction.
///
/// One implementing type per platform; its owned state stands in for the
/// opaque context a driver table would otherwise carry.
#[async_trait]
pub trait Gpio: Send {
    /// Initialize a pin by port and pin number, returning a handle.
    ///
    /// `mode` encodes direction and pull configuration. An unsupported
    /// port/pin/mode combination fails with `InvalidConfig`; a pin already
    /// claimed, or a full pin table, fails with `ResourceExhausted`.
    async fn init(&mut self, port: i32, pin: i32, mode: PinMode) -> Result<i32>;

    /// Release a pin by handle.
    async fn deinit(&mut self, handle: i32) -> Result<()>;

    /// Drive a pin's output level.
    async fn set(&mut self, handle: i32, level: Level) -> Result<()>;

    /// Read a pin's current level.
    async fn get(&mut self, handle: i32) -> Result<Level>;
}

/// Blanket implementation of Gpio for mutable references to Gpio
#[async_trait]
impl<T: Gpio + ?Sized> Gpio for &mut T {
    async fn init(&mut self, port: i32, pin: i32, mode: PinMode) -> Result<i32> {
        (**self).init(port, pin, mode).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn set(&mut self, handle: i32, level: Level) -> Result<()> {
        (**self).set(handle, level).await
    }

    async fn get(&mut self, handle: i32) -> Result<Level> {
        (**self).get(handle).await
    }
}

/// Blanket implementation of Gpio for boxed Gpio types
#[async_trait]
impl<T: Gpio + ?Sized> Gpio for Box<T> {
    async fn init(&mut self, port: i32, pin: i32, mode: PinMode) -> Result<i32> {
        (**self).init(port, pin, mode).await
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        (**self).deinit(handle).await
    }

    async fn set(&mut self, handle: i32, level: Level) -> Result<()> {
        (**self).set(handle, level).await
    }

    async fn get(&mut self, handle: i32) -> Result<Level> {
        (**self).get(handle).await
    }
}

/// Null GPIO implementation for platforms without the class.
pub struct NullGpio;

#[async_trait]
impl Gpio for NullGpio {
    async fn init(&mut self, _port: i32, _pin: i32, _mode: PinMode) -> Result<i32> {
        Err(Error::Unsupported)
    }

    async fn deinit(&mut self, _handle: i32) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn set(&mut self, _handle: i32, _level: Level) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn get(&mut self, _handle: i32) -> Result<Level> {
        Err(Error::Unsupported)
    }
}
