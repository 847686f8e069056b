//! Command-line interface for the kitsune daemon.
//!
//! This binary exercises a running daemon through the tunnel protocol: pin
//! reads and writes, I2C bus scans, SPI exchanges, and UART transfers. It
//! is an operator tool, not a guest runtime; it opens each device for the
//! duration of one command and releases it before exiting.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpStream;

use kitsune_hal::error::Error;
use kitsune_hal::hw_trait::{Gpio, I2c, Level, PinMode, Spi, Uart, UartFlags};
use kitsune_hal::tunnel::{TunnelChannel, TunnelGpio, TunnelI2c, TunnelSpi, TunnelUart};

#[derive(Parser)]
#[command(name = "kitsune-cli", about = "Exercise a kitsune daemon's peripherals")]
struct Args {
    /// Daemon address
    #[arg(short, long, default_value = "127.0.0.1:4817")]
    connect: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pin operations
    Gpio {
        #[command(subcommand)]
        op: GpioOp,
    },
    /// Bus scans and transfers
    I2c {
        #[command(subcommand)]
        op: I2cOp,
    },
    /// Full-duplex exchanges
    Spi {
        #[command(subcommand)]
        op: SpiOp,
    },
    /// Serial transfers
    Uart {
        #[command(subcommand)]
        op: UartOp,
    },
}

#[derive(Subcommand)]
enum GpioOp {
    /// Read a pin's level
    Get { port: i32, pin: i32 },
    /// Drive a pin's level (0 or 1)
    Set { port: i32, pin: i32, level: u8 },
}

#[derive(Subcommand)]
enum I2cOp {
    /// Probe every 7-bit address and report responders
    Scan {
        #[arg(long, default_value_t = 0)]
        dev: u32,
        #[arg(long, default_value_t = 100_000)]
        baud: u32,
    },
}

#[derive(Subcommand)]
enum SpiOp {
    /// Exchange hex-encoded bytes, printing what came back
    Xfer {
        data: String,
        #[arg(long, default_value_t = 0)]
        dev: u32,
        #[arg(long, default_value_t = 1_000_000)]
        baud: u32,
    },
}

#[derive(Subcommand)]
enum UartOp {
    /// Transmit text, then print whatever is readable without blocking
    Send {
        text: String,
        #[arg(long, default_value_t = 0)]
        dev: u32,
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.connect)
        .await
        .with_context(|| format!("Failed to connect to daemon at {}", args.connect))?;
    let channel = TunnelChannel::new(stream);

    match args.command {
        Command::Gpio { op } => gpio(channel, op).await,
        Command::I2c { op } => i2c(channel, op).await,
        Command::Spi { op } => spi(channel, op).await,
        Command::Uart { op } => uart(channel, op).await,
    }
}

async fn gpio(channel: TunnelChannel, op: GpioOp) -> Result<()> {
    let mut gpio = TunnelGpio::new(channel);
    match op {
        GpioOp::Get { port, pin } => {
            let handle = gpio.init(port, pin, PinMode::INPUT).await?;
            let level = gpio.get(handle).await?;
            gpio.deinit(handle).await?;
            println!("{}", level as u8);
        }
        GpioOp::Set { port, pin, level } => {
            let handle = gpio.init(port, pin, PinMode::OUTPUT).await?;
            gpio.set(handle, Level::from(level != 0)).await?;
            gpio.deinit(handle).await?;
        }
    }
    Ok(())
}

async fn i2c(channel: TunnelChannel, op: I2cOp) -> Result<()> {
    let mut i2c = TunnelI2c::new(channel);
    match op {
        I2cOp::Scan { dev, baud } => {
            let handle = i2c.init(dev, baud, -1, -1).await?;
            for addr in 0x08..=0x77u16 {
                match i2c.write(handle, addr, &[]).await {
                    Ok(()) => println!("0x{addr:02x}"),
                    Err(Error::NoAck) => {}
                    Err(e) => {
                        i2c.deinit(handle).await?;
                        return Err(e.into());
                    }
                }
            }
            i2c.deinit(handle).await?;
        }
    }
    Ok(())
}

async fn spi(channel: TunnelChannel, op: SpiOp) -> Result<()> {
    let mut spi = TunnelSpi::new(channel);
    match op {
        SpiOp::Xfer { data, dev, baud } => {
            let mut bytes = hex::decode(&data).context("Data must be hex bytes")?;
            let handle = spi.init(dev, baud, -1, -1, -1, -1).await?;
            spi.transfer_inplace(handle, &mut bytes).await?;
            spi.deinit(handle).await?;
            println!("{}", hex::encode(bytes));
        }
    }
    Ok(())
}

async fn uart(channel: TunnelChannel, op: UartOp) -> Result<()> {
    let mut uart = TunnelUart::new(channel);
    match op {
        UartOp::Send { text, dev, baud } => {
            let handle = uart.init(dev, baud, -1, -1).await?;
            let written = uart
                .write(handle, UartFlags::empty(), text.as_bytes())
                .await?;
            println!("wrote {written} bytes");

            let mut buff = [0u8; 256];
            let read = uart.read(handle, UartFlags::NONBLOCK, &mut buff).await?;
            if read > 0 {
                println!("read: {}", String::from_utf8_lossy(&buff[..read]));
            }
            uart.deinit(handle).await?;
        }
    }
    Ok(())
}
