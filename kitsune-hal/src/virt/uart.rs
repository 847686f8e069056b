//! Virtual UART with loopback wiring.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tokio::time::{self, Duration};

use crate::config::VirtUartConfig;
use crate::error::{Error, Result};
use crate::hw_trait::{Uart, UartFlags};
use crate::registry::Registry;
use crate::tracing::prelude::*;

struct Device {
    dev: u32,
    /// Receive queue, fed by the device's own transmitter (loopback wiring)
    line: VecDeque<u8>,
}

/// In-memory UART bank with each device's TX looped back to its RX.
///
/// The transmitter models a FIFO of `fifo_depth` bytes: a non-blocking write
/// moves at most one FIFO's worth per call, a blocking write drains however
/// much it takes. A blocking read of an idle line waits `read_timeout_ms`
/// and then fails with `Timeout`.
pub struct VirtUart {
    devs: u32,
    fifo_depth: usize,
    read_timeout: Duration,
    open: HashSet<u32>,
    registry: Registry<Device>,
}

impl VirtUart {
    pub fn new(config: &VirtUartConfig) -> Self {
        Self {
            devs: config.devs,
            fifo_depth: config.fifo_depth,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            open: HashSet::new(),
            registry: Registry::with_capacity(config.devs as usize),
        }
    }
}

fn pin_ok(pin: i32) -> bool {
    pin >= -1
}

#[async_trait]
impl Uart for VirtUart {
    async fn init(&mut self, dev: u32, baud: u32, tx: i32, rx: i32) -> Result<i32> {
        if dev >= self.devs || baud == 0 || !pin_ok(tx) || !pin_ok(rx) {
            debug!(dev, baud, tx, rx, "Rejecting UART configuration.");
            return Err(Error::InvalidConfig);
        }
        if self.open.contains(&dev) {
            return Err(Error::ResourceExhausted);
        }

        let handle = self.registry.insert(Device {
            dev,
            line: VecDeque::new(),
        })?;
        self.open.insert(dev);
        trace!(dev, baud, handle, "UART initialized.");
        Ok(handle)
    }

    async fn deinit(&mut self, handle: i32) -> Result<()> {
        let device = self.registry.remove(handle)?;
        self.open.remove(&device.dev);
        trace!(dev = device.dev, handle, "UART released.");
        Ok(())
    }

    async fn write(&mut self, handle: i32, flags: UartFlags, data: &[u8]) -> Result<usize> {
        let fifo_depth = self.fifo_depth;
        let device = self.registry.get_mut(handle)?;

        let count = if flags.contains(UartFlags::NONBLOCK) {
            data.len().min(fifo_depth)
        } else {
            data.len()
        };
        device.line.extend(&data[..count]);
        Ok(count)
    }

    async fn read(&mut self, handle: i32, flags: UartFlags, buff: &mut [u8]) -> Result<usize> {
        let read_timeout = self.read_timeout;
        let device = self.registry.get_mut(handle)?;

        if device.line.is_empty() {
            if flags.contains(UartFlags::NONBLOCK) {
                return Ok(0);
            }
            // Nothing can arrive while we hold the bus, so a bounded wait
            // on an idle line always elapses.
            time::sleep(read_timeout).await;
            return Err(Error::Timeout);
        }

        let count = buff.len().min(device.line.len());
        for (slot, byte) in buff.iter_mut().zip(device.line.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uart() -> VirtUart {
        VirtUart::new(&VirtUartConfig::default())
    }

    #[tokio::test]
    async fn loopback_write_then_read() {
        let mut uart = uart();
        let handle = uart.init(0, 115200, -1, -1).await.unwrap();

        let written = uart.write(handle, UartFlags::empty(), b"ping").await.unwrap();
        assert_eq!(written, 4);

        let mut buff = [0u8; 16];
        let read = uart.read(handle, UartFlags::empty(), &mut buff).await.unwrap();
        assert_eq!(&buff[..read], b"ping");
    }

    #[tokio::test]
    async fn nonblocking_write_is_capped_by_fifo_depth() {
        let config = VirtUartConfig {
            fifo_depth: 8,
            ..VirtUartConfig::default()
        };
        let mut uart = VirtUart::new(&config);
        let handle = uart.init(0, 9600, -1, -1).await.unwrap();

        let oversize = [0xa5u8; 20];
        let written = uart
            .write(handle, UartFlags::NONBLOCK, &oversize)
            .await
            .unwrap();
        assert!(written < oversize.len());
        assert_eq!(written, 8);
    }

    #[tokio::test]
    async fn blocking_write_moves_everything() {
        let config = VirtUartConfig {
            fifo_depth: 8,
            ..VirtUartConfig::default()
        };
        let mut uart = VirtUart::new(&config);
        let handle = uart.init(0, 9600, -1, -1).await.unwrap();

        let oversize = [0x5au8; 20];
        let written = uart
            .write(handle, UartFlags::empty(), &oversize)
            .await
            .unwrap();
        assert_eq!(written, oversize.len());
    }

    #[tokio::test]
    async fn nonblocking_read_of_idle_line_is_empty() {
        let mut uart = uart();
        let handle = uart.init(0, 115200, -1, -1).await.unwrap();

        let mut buff = [0u8; 4];
        assert_eq!(
            uart.read(handle, UartFlags::NONBLOCK, &mut buff).await,
            Ok(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_read_of_idle_line_times_out() {
        let mut uart = uart();
        let handle = uart.init(0, 115200, -1, -1).await.unwrap();

        let mut buff = [0u8; 4];
        assert_eq!(
            uart.read(handle, UartFlags::empty(), &mut buff).await,
            Err(Error::Timeout)
        );
    }

    #[tokio::test]
    async fn short_read_drains_queue_across_calls() {
        let mut uart = uart();
        let handle = uart.init(0, 115200, -1, -1).await.unwrap();
        uart.write(handle, UartFlags::empty(), b"abcdef").await.unwrap();

        let mut buff = [0u8; 4];
        let first = uart.read(handle, UartFlags::empty(), &mut buff).await.unwrap();
        assert_eq!(&buff[..first], b"abcd");
        let second = uart.read(handle, UartFlags::empty(), &mut buff).await.unwrap();
        assert_eq!(&buff[..second], b"ef");
    }

    #[tokio::test]
    async fn busy_device_and_bad_config() {
        let mut uart = uart();
        assert_eq!(uart.init(0, 0, -1, -1).await, Err(Error::InvalidConfig));
        assert_eq!(uart.init(99, 9600, -1, -1).await, Err(Error::InvalidConfig));
        assert_eq!(uart.init(0, 9600, -2, -1).await, Err(Error::InvalidConfig));

        let handle = uart.init(0, 9600, -1, -1).await.unwrap();
        assert_eq!(uart.init(0, 9600, -1, -1).await, Err(Error::ResourceExhausted));
        uart.deinit(handle).await.unwrap();
        assert!(uart.init(0, 9600, -1, -1).await.is_ok());
    }

    #[tokio::test]
    async fn stale_handle_is_rejected() {
        let mut uart = uart();
        let handle = uart.init(1, 9600, -1, -1).await.unwrap();
        uart.deinit(handle).await.unwrap();

        let mut buff = [0u8; 1];
        assert_eq!(uart.deinit(handle).await, Err(Error::InvalidHandle));
        assert_eq!(
            uart.write(handle, UartFlags::empty(), b"x").await,
            Err(Error::InvalidHandle)
        );
        assert_eq!(
            uart.read(handle, UartFlags::empty(), &mut buff).await,
            Err(Error::InvalidHandle)
        );
    }
}
