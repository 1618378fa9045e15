pub mod message;
pub mod plugin;

#[cfg(feature = "test-utils")]
pub mod plugin_test_util;

pub use message::{ChannelCapabilities, ChannelMessage, MessageContent, MessageDirection, Participant};
pub use plugin::{ChannelPlugin, ChannelState, LogLevel, PluginError};
