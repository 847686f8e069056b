//! Platform registry.
//!
//! A platform is whatever can produce a populated [`DriverTable`]: the
//! in-memory virtual devices, a tunnel to a remote daemon, or a real chip's
//! drivers in a downstream crate. Platforms register themselves with
//! `inventory::submit!` and are resolved by name at startup.

use async_trait::async_trait;

use crate::config::Config;
use crate::table::DriverTable;

/// A source of driver tables.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Open the platform's devices and assemble its driver table.
    async fn open(&self, config: &Config) -> anyhow::Result<DriverTable>;
}

/// Registration record for one platform.
pub struct PlatformDescriptor {
    /// Name used in configuration to select this platform
    pub name: &'static str,
    /// Factory for the platform itself
    pub build: fn() -> Box<dyn Platform>,
}

inventory::collect!(PlatformDescriptor);

/// Find a registered platform by name.
pub fn find_platform(name: &str) -> Option<&'static PlatformDescriptor> {
    inventory::iter::<PlatformDescriptor>().find(|desc| desc.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_platforms_are_registered() {
        assert!(find_platform("virt").is_some());
        assert!(find_platform("tunnel").is_some());
        assert!(find_platform("no-such-platform").is_none());
    }

    #[tokio::test]
    async fn virt_platform_opens_from_defaults() {
        let descriptor = find_platform("virt").unwrap();
        let platform = (descriptor.build)();
        let mut table = platform.open(&Config::default()).await.unwrap();

        let handle = table
            .gpio()
            .init(0, 0, crate::hw_trait::PinMode::INPUT)
            .await
            .unwrap();
        table.gpio().deinit(handle).await.unwrap();
    }
}
