//! Configuration management for the kitsune daemon and platforms.
//!
//! This module handles loading configuration from TOML files. Every field
//! has a serde default so a partial file (or no file at all) yields a
//! working configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Daemon configuration
    pub daemon: DaemonConfig,

    /// Platform selection
    pub platform: PlatformConfig,

    /// Virtual platform shape
    pub virt: VirtConfig,

    /// Tunnel platform (client side) configuration
    pub tunnel: TunnelConfig,
}

/// Daemon process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// TCP listen address for guest connections
    pub listen: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4817".to_string(),
        }
    }
}

/// Which registered platform backs the driver table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform name as registered in the platform registry
    pub name: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: "virt".to_string(),
        }
    }
}

/// Shape of the virtual platform's devices.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtConfig {
    pub gpio: VirtGpioConfig,
    pub uart: VirtUartConfig,
    pub spi: VirtSpiConfig,
    pub i2c: VirtI2cConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtGpioConfig {
    /// Number of ports in the bank
    pub ports: u32,

    /// Pins per port
    pub pins: u32,
}

impl Default for VirtGpioConfig {
    fn default() -> Self {
        Self { ports: 4, pins: 32 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtUartConfig {
    /// Number of UART devices
    pub devs: u32,

    /// Modeled TX FIFO depth; non-blocking writes cap at this many bytes
    pub fifo_depth: usize,

    /// Bounded-blocking read window in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for VirtUartConfig {
    fn default() -> Self {
        Self {
            devs: 2,
            fifo_depth: 64,
            read_timeout_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtSpiConfig {
    /// Number of SPI devices
    pub devs: u32,

    /// Largest transfer the bus accepts in one operation
    pub max_transfer: usize,

    /// Byte driven on MOSI during read-only clocking
    pub idle_fill: u8,
}

impl Default for VirtSpiConfig {
    fn default() -> Self {
        Self {
            devs: 2,
            max_transfer: 4096,
            idle_fill: 0x00,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtI2cConfig {
    /// Number of I2C buses
    pub devs: u32,

    /// Register-addressable target addresses present on every bus
    pub targets: Vec<u16>,

    /// Reset target register pointers on every bus release, so that only
    /// repeated-START sequences observe a pointer written in a previous
    /// phase
    pub interloper: bool,
}

impl Default for VirtI2cConfig {
    fn default() -> Self {
        Self {
            devs: 2,
            targets: vec![0x24, 0x4c],
            interloper: false,
        }
    }
}

/// Tunnel platform (client side) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Address of the remote daemon to mount
    pub connect: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            connect: "127.0.0.1:4817".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Checks the `KITSUNE_CONFIG` environment variable first, then
    /// `/etc/kitsune/kitsune.toml`. Falls back to defaults when neither
    /// names an existing file.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("KITSUNE_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let system = Path::new("/etc/kitsune/kitsune.toml");
        if system.exists() {
            return Self::load_from(system);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.platform.name, "virt");
        assert!(config.virt.gpio.ports > 0);
        assert!(config.virt.uart.fifo_depth > 0);
        assert!(!config.virt.i2c.interloper);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [daemon]
            listen = "0.0.0.0:9000"

            [virt.i2c]
            interloper = true
            "#,
        )
        .unwrap();

        assert_eq!(parsed.daemon.listen, "0.0.0.0:9000");
        assert!(parsed.virt.i2c.interloper);
        // Untouched sections keep their defaults.
        assert_eq!(parsed.platform.name, "virt");
        assert_eq!(parsed.virt.spi.max_transfer, 4096);
    }

    #[test]
    fn empty_file_parses() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.daemon.listen, Config::default().daemon.listen);
    }
}
