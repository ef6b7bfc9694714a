//! Fire-and-forget hook dispatch.

use crate::{Hook, HookArg, HookName, Plugin};
use std::fmt;
use tracing::{trace, warn};

/// Invokes `hook` on `plugin`.
///
/// A failing hook is logged and otherwise ignored; plugins observe the trace
/// but never steer it.
pub fn execute_hook(plugin: &dyn Plugin, hook: Hook<'_>) {
    let name = hook.name();
    let result = match hook {
        Hook::DnsResolve { domain } => plugin.on_dns_resolve(domain).map(|resolved| {
            if let Some(ip) = resolved {
                trace!(plugin = plugin.name(), domain = domain, ip = %ip, "Plugin resolved domain");
            }
        }),
        Hook::NewIpFound { addr } => plugin.on_new_ip_found(addr),
        Hook::TtlChange { ttl } => plugin.on_ttl_change(ttl),
        Hook::TtlCompleted { ttl, hops } => plugin.on_ttl_completed(ttl, hops),
    };

    if let Err(e) = result {
        warn!(plugin = plugin.name(), hook = %name, error = %e, "Plugin hook failed");
    }
}

/// Invokes the hook called `hook_name` on `plugin` with positional `args`.
///
/// Unknown hook names and arguments that do not fit the hook are logged and
/// skipped, never reported to the caller.
pub fn execute_named_hook(plugin: &dyn Plugin, hook_name: &str, args: &[HookArg<'_>]) {
    let name = match hook_name.parse::<HookName>() {
        Ok(name) => name,
        Err(e) => {
            warn!(plugin = plugin.name(), error = %e, "Skipping hook");
            return;
        }
    };

    match Hook::from_args(name, args) {
        Ok(hook) => execute_hook(plugin, hook),
        Err(e) => warn!(plugin = plugin.name(), error = %e, "Skipping hook"),
    }
}

/// The enabled plugins of a trace, in enable-list order.
#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginSet {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Delivers `hook` to every plugin in order.
    pub fn fire(&self, hook: Hook<'_>) {
        for plugin in &self.plugins {
            execute_hook(plugin.as_ref(), hook);
        }
    }

    /// Delivers the hook called `hook_name` to every plugin in order.
    pub fn fire_named(&self, hook_name: &str, args: &[HookArg<'_>]) {
        for plugin in &self.plugins {
            execute_named_hook(plugin.as_ref(), hook_name, args);
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl From<Vec<Box<dyn Plugin>>> for PluginSet {
    fn from(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self::new(plugins)
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
