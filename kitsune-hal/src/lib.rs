//! Kitsune: a peripheral capability layer for sandboxed guest modules.
//!
//! Guests invoke GPIO, UART, SPI, and I2C operations through a host-provided
//! driver table without ever linking platform drivers. The crate provides
//! the capability traits ([`hw_trait`]), the immutable driver table
//! ([`table`]), the class+verb dispatch surface ([`dispatch`]), a versioned
//! wire rendering of that surface ([`wire`], [`tunnel`]), and an in-memory
//! reference platform ([`virt`]).

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hw_trait;
pub mod platform;
pub mod registry;
pub mod table;
pub mod tracing;
pub mod tunnel;
pub mod virt;
pub mod wire;
