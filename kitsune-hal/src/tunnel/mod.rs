//! Tunnel transport: the wire protocol served over a byte stream.
//!
//! The server side drives one connection against a shared dispatcher; the
//! client side is a set of driver types that implement the four capability
//! traits by tunneling each call to a remote daemon, making that daemon
//! mountable as a local platform.

pub mod client;
pub mod server;

mod drivers;

pub use client::TunnelChannel;
pub use drivers::{TunnelGpio, TunnelI2c, TunnelSpi, TunnelUart};

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::Config;
use crate::platform::{Platform, PlatformDescriptor};
use crate::table::DriverTable;
use crate::tracing::prelude::*;

struct TunnelPlatform;

#[async_trait]
impl Platform for TunnelPlatform {
    async fn open(&self, config: &Config) -> anyhow::Result<DriverTable> {
        use anyhow::Context;

        let addr = &config.tunnel.connect;
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to daemon at {addr}"))?;
        info!(daemon = %addr, "Tunnel connected.");

        let channel = TunnelChannel::new(stream);
        Ok(DriverTable::builder()
            .gpio(TunnelGpio::new(channel.clone()))
            .uart(TunnelUart::new(channel.clone()))
            .spi(TunnelSpi::new(channel.clone()))
            .i2c(TunnelI2c::new(channel))
            .build())
    }
}

inventory::submit! {
    PlatformDescriptor {
        name: "tunnel",
        build: || Box::new(TunnelPlatform),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    use crate::config::VirtConfig;
    use crate::dispatch::Dispatcher;
    use crate::error::Error;
    use crate::hw_trait::{Gpio, I2c, Level, PinMode, Spi, Uart, UartFlags};
    use crate::virt;

    /// A virt-backed daemon on one end of an in-memory stream, a tunnel
    /// channel on the other.
    fn harness() -> (TunnelChannel, CancellationToken) {
        let (guest_side, host_side) = tokio::io::duplex(4096);
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new(virt::table(
            &VirtConfig::default(),
        ))));
        let running = CancellationToken::new();
        tokio::spawn(server::serve(host_side, dispatcher, running.clone()));
        (TunnelChannel::new(guest_side), running)
    }

    #[tokio::test]
    async fn gpio_round_trip_through_tunnel() {
        let (channel, _running) = harness();
        let mut gpio = TunnelGpio::new(channel);

        let handle = gpio
            .init(0, 1, PinMode::INPUT | PinMode::OUTPUT)
            .await
            .unwrap();
        gpio.set(handle, Level::High).await.unwrap();
        assert_eq!(gpio.get(handle).await.unwrap(), Level::High);
        gpio.deinit(handle).await.unwrap();
        assert_eq!(gpio.get(handle).await, Err(Error::InvalidHandle));
    }

    #[tokio::test]
    async fn spi_transfer_inplace_through_tunnel() {
        let (channel, _running) = harness();
        let mut spi = TunnelSpi::new(channel);

        let handle = spi.init(0, 1_000_000, -1, -1, -1, -1).await.unwrap();
        let mut data = vec![0x55u8, 0xaa, 0x0f];
        let sent = data.clone();
        spi.transfer_inplace(handle, &mut data).await.unwrap();
        assert_eq!(data, sent);
        assert_eq!(spi.exec(handle).await, Err(Error::Unsupported));
    }

    #[tokio::test]
    async fn i2c_write_read_through_tunnel() {
        let (channel, _running) = harness();
        let mut i2c = TunnelI2c::new(channel);

        let handle = i2c.init(0, 100_000, -1, -1).await.unwrap();
        i2c.write(handle, 0x24, &[0x08, 0x42]).await.unwrap();

        let mut value = [0u8; 1];
        i2c.write_read(handle, 0x24, &[0x08], &mut value).await.unwrap();
        assert_eq!(value, [0x42]);

        assert_eq!(i2c.write(handle, 0x7f, &[0]).await, Err(Error::NoAck));
    }

    #[tokio::test]
    async fn uart_loopback_through_tunnel() {
        let (channel, _running) = harness();
        let mut uart = TunnelUart::new(channel);

        let handle = uart.init(0, 115200, -1, -1).await.unwrap();
        let written = uart
            .write(handle, UartFlags::empty(), b"marco")
            .await
            .unwrap();
        assert_eq!(written, 5);

        let mut buff = [0u8; 16];
        let read = uart
            .read(handle, UartFlags::NONBLOCK, &mut buff)
            .await
            .unwrap();
        assert_eq!(&buff[..read], b"marco");
    }

    #[tokio::test]
    async fn channel_is_shareable_across_classes() {
        let (channel, _running) = harness();
        let mut gpio = TunnelGpio::new(channel.clone());
        let mut spi = TunnelSpi::new(channel);

        let pin = gpio.init(0, 0, PinMode::OUTPUT).await.unwrap();
        let bus = spi.init(0, 1_000_000, -1, -1, -1, -1).await.unwrap();
        gpio.set(pin, Level::High).await.unwrap();
        spi.write(bus, &[0x01]).await.unwrap();
    }

    #[tokio::test]
    async fn server_shutdown_surfaces_as_io_error() {
        let (channel, running) = harness();
        let mut gpio = TunnelGpio::new(channel);

        let handle = gpio.init(0, 0, PinMode::OUTPUT).await.unwrap();
        running.cancel();
        // Let the server observe cancellation and close the stream; the next
        // call then fails at the transport and is reported as the Io class.
        tokio::task::yield_now().await;
        assert_eq!(gpio.set(handle, Level::High).await, Err(Error::Io));
    }
}
