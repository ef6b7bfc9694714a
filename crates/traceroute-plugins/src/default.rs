//! The no-op plugin.

use crate::{Plugin, PluginParams};

/// A plugin that accepts every hook and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlugin;

impl DefaultPlugin {
    pub const NAME: &'static str = "default";

    /// Registry constructor; parameters are ignored.
    pub fn construct(_params: &PluginParams) -> Option<Box<dyn Plugin>> {
        Some(Box::new(DefaultPlugin))
    }
}

impl Plugin for DefaultPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }
}
