pub mod plugin;
pub mod registry;

pub use plugin::{Plugin, PluginArtifact, PluginInfo, PluginState};
pub use registry::{
    registry, AbiStrFn, CreatePluginFn, DestroyPluginFn, PluginFactory, PluginHandle,
    PluginRegistry, ABI_VERSION,
};
