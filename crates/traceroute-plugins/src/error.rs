//! Error types for plugins and hook dispatch.

use crate::HookName;
use thiserror::Error;

/// Errors raised by plugins or while dispatching a hook to them.
///
/// None of these reach the trace itself: dispatch logs them and moves on.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Hook {0} not found")]
    UnknownHook(String),

    #[error("Hook {hook} expects arguments ({expected})")]
    BadArguments {
        hook: HookName,
        expected: &'static str,
    },

    #[error("Plugin {plugin} failed: {message}")]
    Failed { plugin: String, message: String },
}

impl PluginError {
    /// Convenience constructor for plugin implementations.
    pub fn failed(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}
