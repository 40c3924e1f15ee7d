//! Plugin capability interface and registry
//!
//! Plugins are created by the embedding application, which also decides
//! when to call their lifecycle hooks. The registry only tracks them.

mod metadata;
mod registry;

pub use metadata::PluginMetadata;
pub use registry::PluginRegistry;

use crate::error::BoxError;

/// Result of a plugin lifecycle callback
pub type PluginResult = Result<(), BoxError>;

/// Behaviour every extension implements
pub trait Plugin: Send + Sync {
    /// Metadata fixed at construction
    fn metadata(&self) -> &PluginMetadata;

    /// Called when the plugin becomes active, at most once per activation.
    /// May run on any thread.
    fn on_enable(&self) -> PluginResult;

    /// Called on deactivation. Must tolerate being called without a prior
    /// `on_enable`.
    fn on_disable(&self) -> PluginResult;
}
