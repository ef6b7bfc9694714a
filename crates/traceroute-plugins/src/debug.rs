//! A plugin that logs trace progress.

use crate::{Plugin, PluginError, PluginParams};
use std::net::IpAddr;
use traceroute_core::TracerouteHop;
use tracing::info;

/// Highest debug level at which progress is logged.
pub const DEBUG_LEVEL_THRESHOLD: i32 = 2;

/// Logs hop changes, newly seen addresses and completed hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPlugin {
    pub debug_level: i32,
}

impl DebugPlugin {
    pub const NAME: &'static str = "debug";

    pub fn new(debug_level: i32) -> Self {
        Self { debug_level }
    }

    /// Registry constructor; `params` must be an integer debug level.
    pub fn construct(params: &PluginParams) -> Option<Box<dyn Plugin>> {
        let debug_level = i32::try_from(params.as_i64()?).ok()?;
        Some(Box::new(Self::new(debug_level)))
    }

    fn enabled(&self) -> bool {
        self.debug_level <= DEBUG_LEVEL_THRESHOLD
    }
}

impl Plugin for DebugPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_ttl_change(&self, ttl: u16) -> Result<(), PluginError> {
        if self.enabled() {
            info!(debug_level = self.debug_level, ttl = ttl, "TTL changed");
        }
        Ok(())
    }

    fn on_new_ip_found(&self, addr: IpAddr) -> Result<(), PluginError> {
        if self.enabled() {
            info!(debug_level = self.debug_level, ip = %addr, "New IP found");
        }
        Ok(())
    }

    fn on_ttl_completed(&self, ttl: u16, hops: &[TracerouteHop]) -> Result<(), PluginError> {
        if self.enabled() {
            let replies = hops.iter().filter(|hop| hop.success).count();
            info!(
                debug_level = self.debug_level,
                ttl = ttl,
                probes = hops.len(),
                replies = replies,
                "TTL completed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_construct_requires_integer_level() {
        assert!(DebugPlugin::construct(&json!(2)).is_some());
        assert!(DebugPlugin::construct(&json!(-1)).is_some());
        assert!(DebugPlugin::construct(&json!("2")).is_none());
        assert!(DebugPlugin::construct(&json!(null)).is_none());
        assert!(DebugPlugin::construct(&json!(1.5)).is_none());
        assert!(DebugPlugin::construct(&json!(i64::MAX)).is_none());
    }

    #[test]
    fn test_threshold() {
        assert!(DebugPlugin::new(1).enabled());
        assert!(DebugPlugin::new(2).enabled());
        assert!(!DebugPlugin::new(3).enabled());
    }

    #[test]
    fn test_hooks_never_fail() {
        let plugin = DebugPlugin::new(1);
        assert!(plugin.on_ttl_change(4).is_ok());
        assert!(plugin.on_new_ip_found("10.0.0.1".parse().unwrap()).is_ok());
        assert!(plugin
            .on_ttl_completed(4, &[TracerouteHop::timeout(4)])
            .is_ok());
        assert_eq!(plugin.on_dns_resolve("example.com").unwrap(), None);
    }
}
