//! Dispatch surface: class+verb requests resolved against a driver table.
//!
//! This is the composition point between a guest's marshaled request and the
//! concrete platform drivers. Requests carry owned payloads; responses carry
//! a status code and any output bytes. The dispatcher lowers the driver
//! error taxonomy to wire status codes: `0` success, positive values are
//! handles or transfer counts, negative values are error classes.

use strum::FromRepr;

use crate::error::{Error, Result};
use crate::hw_trait::{Level, PinMode, UartFlags};
use crate::table::DriverTable;
use crate::tracing::prelude::*;

/// Largest byte count a single transfer operation may move.
///
/// Guest-specified read lengths are checked against this before any
/// allocation happens, so a hostile length cannot balloon host memory.
pub const MAX_TRANSFER: usize = 4096;

/// Peripheral class selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Class {
    Gpio = 1,
    Uart = 2,
    Spi = 3,
    I2c = 4,
}

/// GPIO operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum GpioVerb {
    Init = 0,
    Deinit = 1,
    Set = 2,
    Get = 3,
}

/// UART operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum UartVerb {
    Init = 0,
    Deinit = 1,
    Write = 2,
    Read = 3,
}

/// SPI operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum SpiVerb {
    Init = 0,
    Deinit = 1,
    Read = 2,
    Write = 3,
    Transfer = 4,
    TransferInplace = 5,
    Exec = 6,
}

/// I2C operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum I2cVerb {
    Init = 0,
    Deinit = 1,
    Write = 2,
    Read = 3,
    WriteRead = 4,
}

/// One marshaled guest request.
///
/// Integer fields keep the fixed boundary widths: handles and pin selectors
/// are `i32`, devices/baud/lengths/mode words are `u32`, I2C addresses are
/// `u16`. Mode and flag words stay raw here; the dispatcher validates them,
/// so unknown bits fail with `InvalidConfig` instead of being dropped during
/// marshaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GpioInit { port: i32, pin: i32, mode: u32 },
    GpioDeinit { handle: i32 },
    GpioSet { handle: i32, level: u32 },
    GpioGet { handle: i32 },

    UartInit { dev: u32, baud: u32, tx: i32, rx: i32 },
    UartDeinit { handle: i32 },
    UartWrite { handle: i32, flags: u32, data: Vec<u8> },
    UartRead { handle: i32, flags: u32, len: u32 },

    SpiInit { dev: u32, baud: u32, mosi: i32, miso: i32, sck: i32, cs: i32 },
    SpiDeinit { handle: i32 },
    SpiRead { handle: i32, len: u32 },
    SpiWrite { handle: i32, data: Vec<u8> },
    SpiTransfer { handle: i32, write: Vec<u8> },
    SpiTransferInplace { handle: i32, data: Vec<u8> },
    SpiExec { handle: i32 },

    I2cInit { dev: u32, baud: u32, sda: i32, scl: i32 },
    I2cDeinit { handle: i32 },
    I2cWrite { handle: i32, addr: u16, data: Vec<u8> },
    I2cRead { handle: i32, addr: u16, len: u32 },
    I2cWriteRead { handle: i32, addr: u16, data: Vec<u8>, read_len: u32 },
}

impl Request {
    /// Peripheral class this request addresses.
    pub fn class(&self) -> Class {
        use Request::*;
        match self {
            GpioInit { .. } | GpioDeinit { .. } | GpioSet { .. } | GpioGet { .. } => Class::Gpio,
            UartInit { .. } | UartDeinit { .. } | UartWrite { .. } | UartRead { .. } => Class::Uart,
            SpiInit { .. } | SpiDeinit { .. } | SpiRead { .. } | SpiWrite { .. }
            | SpiTransfer { .. } | SpiTransferInplace { .. } | SpiExec { .. } => Class::Spi,
            I2cInit { .. } | I2cDeinit { .. } | I2cWrite { .. } | I2cRead { .. }
            | I2cWriteRead { .. } => Class::I2c,
        }
    }

    /// Verb discriminant within the class, as carried on the wire.
    pub fn verb(&self) -> u8 {
        use Request::*;
        match self {
            GpioInit { .. } => GpioVerb::Init as u8,
            GpioDeinit { .. } => GpioVerb::Deinit as u8,
            GpioSet { .. } => GpioVerb::Set as u8,
            GpioGet { .. } => GpioVerb::Get as u8,

            UartInit { .. } => UartVerb::Init as u8,
            UartDeinit { .. } => UartVerb::Deinit as u8,
            UartWrite { .. } => UartVerb::Write as u8,
            UartRead { .. } => UartVerb::Read as u8,

            SpiInit { .. } => SpiVerb::Init as u8,
            SpiDeinit { .. } => SpiVerb::Deinit as u8,
            SpiRead { .. } => SpiVerb::Read as u8,
            SpiWrite { .. } => SpiVerb::Write as u8,
            SpiTransfer { .. } => SpiVerb::Transfer as u8,
            SpiTransferInplace { .. } => SpiVerb::TransferInplace as u8,
            SpiExec { .. } => SpiVerb::Exec as u8,

            I2cInit { .. } => I2cVerb::Init as u8,
            I2cDeinit { .. } => I2cVerb::Deinit as u8,
            I2cWrite { .. } => I2cVerb::Write as u8,
            I2cRead { .. } => I2cVerb::Read as u8,
            I2cWriteRead { .. } => I2cVerb::WriteRead as u8,
        }
    }
}

/// Result of executing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// `0` success, positive handle/count, negative error class
    pub status: i32,
    /// Output bytes for read-style operations; empty otherwise
    pub data: Vec<u8>,
}

impl Response {
    fn ok() -> Self {
        Self {
            status: 0,
            data: Vec::new(),
        }
    }

    fn count(n: i32) -> Self {
        Self {
            status: n,
            data: Vec::new(),
        }
    }

    fn with_data(data: Vec<u8>) -> Self {
        Self { status: 0, data }
    }

    fn error(err: Error) -> Self {
        Self {
            status: err.status(),
            data: Vec::new(),
        }
    }

    /// Whether the status denotes success.
    pub fn is_ok(&self) -> bool {
        self.status >= 0
    }
}

/// Executes requests against an owned driver table.
pub struct Dispatcher {
    table: DriverTable,
}

impl Dispatcher {
    pub fn new(table: DriverTable) -> Self {
        Self { table }
    }

    /// Execute one request, lowering any driver error to its status code.
    pub async fn execute(&mut self, request: Request) -> Response {
        trace!(?request, "Dispatching.");
        match self.run(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, status = err.status(), "Request failed.");
                Response::error(err)
            }
        }
    }

    async fn run(&mut self, request: Request) -> Result<Response> {
        use Request::*;
        match request {
            GpioInit { port, pin, mode } => {
                let mode = PinMode::from_bits(mode).ok_or(Error::InvalidConfig)?;
                let handle = self.table.gpio().init(port, pin, mode).await?;
                Ok(Response::count(handle))
            }
            GpioDeinit { handle } => {
                self.table.gpio().deinit(handle).await?;
                Ok(Response::ok())
            }
            GpioSet { handle, level } => {
                let level = Level::from(level != 0);
                self.table.gpio().set(handle, level).await?;
                Ok(Response::ok())
            }
            GpioGet { handle } => {
                let level = self.table.gpio().get(handle).await?;
                Ok(Response::with_data(vec![level as u8]))
            }

            UartInit { dev, baud, tx, rx } => {
                let handle = self.table.uart().init(dev, baud, tx, rx).await?;
                Ok(Response::count(handle))
            }
            UartDeinit { handle } => {
                self.table.uart().deinit(handle).await?;
                Ok(Response::ok())
            }
            UartWrite { handle, flags, data } => {
                let flags = UartFlags::from_bits(flags).ok_or(Error::InvalidConfig)?;
                check_len(data.len())?;
                let written = self.table.uart().write(handle, flags, &data).await?;
                Ok(Response::count(written as i32))
            }
            UartRead { handle, flags, len } => {
                let flags = UartFlags::from_bits(flags).ok_or(Error::InvalidConfig)?;
                let mut buff = alloc_read(len)?;
                let read = self.table.uart().read(handle, flags, &mut buff).await?;
                buff.truncate(read);
                Ok(Response {
                    status: read as i32,
                    data: buff,
                })
            }

            SpiInit { dev, baud, mosi, miso, sck, cs } => {
                let handle = self.table.spi().init(dev, baud, mosi, miso, sck, cs).await?;
                Ok(Response::count(handle))
            }
            SpiDeinit { handle } => {
                self.table.spi().deinit(handle).await?;
                Ok(Response::ok())
            }
            SpiRead { handle, len } => {
                let mut buff = alloc_read(len)?;
                self.table.spi().read(handle, &mut buff).await?;
                Ok(Response::with_data(buff))
            }
            SpiWrite { handle, data } => {
                check_len(data.len())?;
                self.table.spi().write(handle, &data).await?;
                Ok(Response::ok())
            }
            SpiTransfer { handle, write } => {
                check_len(write.len())?;
                let mut read = vec![0u8; write.len()];
                self.table.spi().transfer(handle, &mut read, &write).await?;
                Ok(Response::with_data(read))
            }
            SpiTransferInplace { handle, mut data } => {
                check_len(data.len())?;
                self.table.spi().transfer_inplace(handle, &mut data).await?;
                Ok(Response::with_data(data))
            }
            SpiExec { handle } => {
                self.table.spi().exec(handle).await?;
                Ok(Response::ok())
            }

            I2cInit { dev, baud, sda, scl } => {
                let handle = self.table.i2c().init(dev, baud, sda, scl).await?;
                Ok(Response::count(handle))
            }
            I2cDeinit { handle } => {
                self.table.i2c().deinit(handle).await?;
                Ok(Response::ok())
            }
            I2cWrite { handle, addr, data } => {
                check_len(data.len())?;
                self.table.i2c().write(handle, addr, &data).await?;
                Ok(Response::ok())
            }
            I2cRead { handle, addr, len } => {
                let mut buff = alloc_read(len)?;
                self.table.i2c().read(handle, addr, &mut buff).await?;
                Ok(Response::with_data(buff))
            }
            I2cWriteRead { handle, addr, data, read_len } => {
                check_len(data.len())?;
                let mut buff = alloc_read(read_len)?;
                self.table
                    .i2c()
                    .write_read(handle, addr, &data, &mut buff)
                    .await?;
                Ok(Response::with_data(buff))
            }
        }
    }
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_TRANSFER {
        return Err(Error::InvalidConfig);
    }
    Ok(())
}

fn alloc_read(len: u32) -> Result<Vec<u8>> {
    let len = len as usize;
    check_len(len)?;
    Ok(vec![0u8; len])
}
