//! Remote drivers: the four capability traits over a tunnel channel.
//!
//! Each driver marshals its calls into wire requests and lowers the
//! returned status back into the error taxonomy. Transport faults are
//! logged with their cause and surfaced as the `Io` class; the driver
//! taxonomy is the only error surface these types expose.

use async_trait::async_trait;

use super::TunnelChannel;
use crate::dispatch::{Request, Response};
use crate::error::{Error, Result};
use crate::hw_trait::{Gpio, I2c, Level, PinMode, Spi, Uart, UartFlags};
use crate::tracing::prelude::*;

async fn call(channel: &TunnelChannel, request: Request) -> Result<Response> {
    let response = channel.call(request).await.map_err(|e| {
        warn!(error = %e, "Tunnel transport fault.");
        Error::Io
    })?;
    if response.status < 0 {
        return Err(Error::from_status(response.status).unwrap_or(Error::Io));
    }
    Ok(response)
}

/// Copy a read-style response payload out into the caller's buffer.
///
/// The daemon never sends more than was asked for; a response that does is
/// malformed and reported as `Io`.
fn fill(buff: &mut [u8], response: &Response) -> Result<usize> {
    if response.data.len() > buff.len() {
        return Err(Error::Io);
    }
    buff[..response.data.len()].copy_from_slice(&response.data);
    Ok(response.data.len())
}

/// GPIO over a tunnel.
pub struct TunnelGpio {
    channel: TunnelChannel,
}

impl TunnelGpio {
    pub fn new(channel: TunnelChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Gpio for TunnelGpio {
    async fn init(&mut self, port: i32, pin: i32, mode: PinMode) -> Result<i32> {
        let response = call(
            &self.channel,
            Request::GpioInit {
                port,
                pin,
                mode: mode.bits(),
            },
        )
        .await?;
        Ok(response.status)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        call(&self.channel, Request::GpioDeinit { handle }).await?;
        Ok(())
    }

    async fn set(&mut self, handle: i32, level: Level) -> Result<()> {
        call(
            &self.channel,
            Request::GpioSet {
                handle,
                level: level as u32,
            },
        )
        .await?;
        Ok(())
    }

    async fn get(&mut self, handle: i32) -> Result<Level> {
        let response = call(&self.channel, Request::GpioGet { handle }).await?;
        match response.data.first() {
            Some(&raw) => Ok(Level::from(raw != 0)),
            None => Err(Error::Io),
        }
    }
}

/// UART over a tunnel.
pub struct TunnelUart {
    channel: TunnelChannel,
}

impl TunnelUart {
    pub fn new(channel: TunnelChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Uart for TunnelUart {
    async fn init(&mut self, dev: u32, baud: u32, tx: i32, rx: i32) -> Result<i32> {
        let response = call(&self.channel, Request::UartInit { dev, baud, tx, rx }).await?;
        Ok(response.status)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        call(&self.channel, Request::UartDeinit { handle }).await?;
        Ok(())
    }

    async fn write(&mut self, handle: i32, flags: UartFlags, data: &[u8]) -> Result<usize> {
        let response = call(
            &self.channel,
            Request::UartWrite {
                handle,
                flags: flags.bits(),
                data: data.to_vec(),
            },
        )
        .await?;
        Ok(response.status as usize)
    }

    async fn read(&mut self, handle: i32, flags: UartFlags, buff: &mut [u8]) -> Result<usize> {
        let response = call(
            &self.channel,
            Request::UartRead {
                handle,
                flags: flags.bits(),
                len: buff.len() as u32,
            },
        )
        .await?;
        fill(buff, &response)
    }
}

/// SPI over a tunnel.
pub struct TunnelSpi {
    channel: TunnelChannel,
}

impl TunnelSpi {
    pub fn new(channel: TunnelChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Spi for TunnelSpi {
    async fn init(
        &mut self,
        dev: u32,
        baud: u32,
        mosi: i32,
        miso: i32,
        sck: i32,
        cs: i32,
    ) -> Result<i32> {
        let response = call(
            &self.channel,
            Request::SpiInit {
                dev,
                baud,
                mosi,
                miso,
                sck,
                cs,
            },
        )
        .await?;
        Ok(response.status)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        call(&self.channel, Request::SpiDeinit { handle }).await?;
        Ok(())
    }

    async fn read(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        let response = call(
            &self.channel,
            Request::SpiRead {
                handle,
                len: data.len() as u32,
            },
        )
        .await?;
        if fill(data, &response)? != data.len() {
            return Err(Error::Io);
        }
        Ok(())
    }

    async fn write(&mut self, handle: i32, data: &[u8]) -> Result<()> {
        call(
            &self.channel,
            Request::SpiWrite {
                handle,
                data: data.to_vec(),
            },
        )
        .await?;
        Ok(())
    }

    async fn transfer(&mut self, handle: i32, read: &mut [u8], write: &[u8]) -> Result<()> {
        if read.len() != write.len() {
            return Err(Error::InvalidConfig);
        }
        let response = call(
            &self.channel,
            Request::SpiTransfer {
                handle,
                write: write.to_vec(),
            },
        )
        .await?;
        if fill(read, &response)? != read.len() {
            return Err(Error::Io);
        }
        Ok(())
    }

    async fn transfer_inplace(&mut self, handle: i32, data: &mut [u8]) -> Result<()> {
        let response = call(
            &self.channel,
            Request::SpiTransferInplace {
                handle,
                data: data.to_vec(),
            },
        )
        .await?;
        if fill(data, &response)? != data.len() {
            return Err(Error::Io);
        }
        Ok(())
    }

    async fn exec(&mut self, handle: i32) -> Result<()> {
        call(&self.channel, Request::SpiExec { handle }).await?;
        Ok(())
    }
}

/// I2C over a tunnel.
pub struct TunnelI2c {
    channel: TunnelChannel,
}

impl TunnelI2c {
    pub fn new(channel: TunnelChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl I2c for TunnelI2c {
    async fn init(&mut self, dev: u32, baud: u32, sda: i32, scl: i32) -> Result<i32> {
        let response = call(&self.channel, Request::I2cInit { dev, baud, sda, scl }).await?;
        Ok(response.status)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        call(&self.channel, Request::I2cDeinit { handle }).await?;
        Ok(())
    }

    async fn write(&mut self, handle: i32, addr: u16, data: &[u8]) -> Result<()> {
        call(
            &self.channel,
            Request::I2cWrite {
                handle,
                addr,
                data: data.to_vec(),
            },
        )
        .await?;
        Ok(())
    }

    async fn read(&mut self, handle: i32, addr: u16, buff: &mut [u8]) -> Result<()> {
        let response = call(
            &self.channel,
            Request::I2cRead {
                handle,
                addr,
                len: buff.len() as u32,
            },
        )
        .await?;
        if fill(buff, &response)? != buff.len() {
            return Err(Error::Io);
        }
        Ok(())
    }

    async fn write_read(
        &mut self,
        handle: i32,
        addr: u16,
        data: &[u8],
        buff: &mut [u8],
    ) -> Result<()> {
        let response = call(
            &self.channel,
            Request::I2cWriteRead {
                handle,
                addr,
                data: data.to_vec(),
                read_len: buff.len() as u32,
            },
        )
        .await?;
        if fill(buff, &response)? != buff.len() {
            return Err(Error::Io);
        }
        Ok(())
    }
}
