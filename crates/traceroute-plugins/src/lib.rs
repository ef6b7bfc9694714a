//! Plugin registry and hook dispatch for traceroute.
//!
//! Plugins observe a trace through a fixed set of hooks:
//!
//! - [`Plugin`] trait with a no-op default for every hook
//! - [`PluginRegistry`] to build plugins by name from an enable-list
//! - [`execute_hook`] / [`execute_named_hook`] and [`PluginSet`] to deliver
//!   hooks without letting plugin failures escape
//! - [`DefaultPlugin`] and [`DebugPlugin`], the bundled plugins

pub mod debug;
pub mod default;
pub mod dispatch;
pub mod error;
pub mod plugin;
pub mod registry;

pub use debug::DebugPlugin;
pub use default::DefaultPlugin;
pub use dispatch::{execute_hook, execute_named_hook, PluginSet};
pub use error::PluginError;
pub use plugin::{Hook, HookArg, HookName, Plugin};
pub use registry::{PluginConstructor, PluginParams, PluginRegistry};
