//! The plugin interface and the hooks it observes.

use crate::PluginError;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use traceroute_core::TracerouteHop;

/// An observer of trace lifecycle events.
///
/// Every hook has a no-op default, so a plugin overrides only what it cares
/// about. Hooks cannot influence the trace: errors they return are logged by
/// the dispatcher and otherwise ignored.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called before the destination hostname is resolved.
    fn on_dns_resolve(&self, _domain: &str) -> Result<Option<IpAddr>, PluginError> {
        Ok(None)
    }

    /// Called the first time an address answers a probe.
    fn on_new_ip_found(&self, _addr: IpAddr) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when the trace advances to a new hop index.
    fn on_ttl_change(&self, _ttl: u16) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once every measurement of a hop has completed.
    fn on_ttl_completed(&self, _ttl: u16, _hops: &[TracerouteHop]) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Symbolic names of the hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    DnsResolve,
    NewIpFound,
    TtlChange,
    TtlCompleted,
}

impl HookName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::DnsResolve => "OnDNSResolve",
            HookName::NewIpFound => "OnNewIPFound",
            HookName::TtlChange => "OnTTLChange",
            HookName::TtlCompleted => "OnTTLCompleted",
        }
    }

    /// Describes the positional arguments the hook takes.
    pub fn signature(&self) -> &'static str {
        match self {
            HookName::DnsResolve => "domain",
            HookName::NewIpFound => "address",
            HookName::TtlChange => "ttl",
            HookName::TtlCompleted => "ttl, hops",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OnDNSResolve" => Ok(HookName::DnsResolve),
            "OnNewIPFound" | "OnIPFound" => Ok(HookName::NewIpFound),
            "OnTTLChange" => Ok(HookName::TtlChange),
            "OnTTLCompleted" => Ok(HookName::TtlCompleted),
            _ => Err(PluginError::UnknownHook(s.to_string())),
        }
    }
}

/// A hook invocation together with its arguments.
#[derive(Debug, Clone, Copy)]
pub enum Hook<'a> {
    DnsResolve { domain: &'a str },
    NewIpFound { addr: IpAddr },
    TtlChange { ttl: u16 },
    TtlCompleted { ttl: u16, hops: &'a [TracerouteHop] },
}

impl<'a> Hook<'a> {
    pub fn name(&self) -> HookName {
        match self {
            Hook::DnsResolve { .. } => HookName::DnsResolve,
            Hook::NewIpFound { .. } => HookName::NewIpFound,
            Hook::TtlChange { .. } => HookName::TtlChange,
            Hook::TtlCompleted { .. } => HookName::TtlCompleted,
        }
    }

    /// Builds an invocation of `name` from positional arguments.
    pub fn from_args(name: HookName, args: &[HookArg<'a>]) -> Result<Self, PluginError> {
        let hook = match (name, args) {
            (HookName::DnsResolve, [HookArg::Str(domain)]) => Hook::DnsResolve { domain: *domain },
            (HookName::NewIpFound, [HookArg::Addr(addr)]) => Hook::NewIpFound { addr: *addr },
            (HookName::TtlChange, [HookArg::Ttl(ttl)]) => Hook::TtlChange { ttl: *ttl },
            (HookName::TtlCompleted, [HookArg::Ttl(ttl), HookArg::Hops(hops)]) => {
                Hook::TtlCompleted {
                    ttl: *ttl,
                    hops: *hops,
                }
            }
            _ => {
                return Err(PluginError::BadArguments {
                    hook: name,
                    expected: name.signature(),
                })
            }
        };
        Ok(hook)
    }
}

/// A positional argument for [`crate::execute_named_hook`].
#[derive(Debug, Clone, Copy)]
pub enum HookArg<'a> {
    Str(&'a str),
    Addr(IpAddr),
    Ttl(u16),
    Hops(&'a [TracerouteHop]),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_name_round_trips_through_str() {
        for name in [
            HookName::DnsResolve,
            HookName::NewIpFound,
            HookName::TtlChange,
            HookName::TtlCompleted,
        ] {
            assert_eq!(name.as_str().parse::<HookName>().unwrap(), name);
        }
        assert_eq!("OnIPFound".parse::<HookName>().unwrap(), HookName::NewIpFound);
        assert!("OnPacketSent".parse::<HookName>().is_err());
    }

    #[test]
    fn test_from_args_checks_shape() {
        let hops = [TracerouteHop::timeout(3)];

        let hook = Hook::from_args(
            HookName::TtlCompleted,
            &[HookArg::Ttl(3), HookArg::Hops(&hops)],
        )
        .unwrap();
        assert!(matches!(hook, Hook::TtlCompleted { ttl: 3, hops } if hops.len() == 1));

        let err = Hook::from_args(HookName::TtlChange, &[HookArg::Str("3")]).unwrap_err();
        assert!(matches!(err, PluginError::BadArguments { hook: HookName::TtlChange, .. }));

        assert!(Hook::from_args(HookName::NewIpFound, &[]).is_err());
    }
}
