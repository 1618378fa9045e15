use async_trait::async_trait;
use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::message::{ChannelCapabilities, ChannelMessage};

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ChannelState {
    Starting,
    Running,
    Draining,
    #[default]
    Stopped,
}

/// What log levels are supported?
/// Higher-value variants are more severe.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info` for anything unknown.
    pub fn from_name(level: &str) -> LogLevel {
        match level.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    /// The matching `EnvFilter` directive. `Critical` maps onto `error`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// The one trait channel authors implement.
///
/// A plugin owns its transport. The host starts it, pulls incoming
/// messages with `receive_message` and pushes replies with `send_message`.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// The name of the plugin
    fn name(&self) -> String;

    /// Metadata about this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Receive the full configuration map.
    fn set_config(&mut self, config: DashMap<String, String>);

    /// Lists the configs understood by the plugin
    fn list_config(&self) -> Vec<String>;

    /// Receive the full secrets map.
    fn set_secrets(&mut self, secrets: DashMap<String, String>);

    /// Lists the secrets required
    fn list_secrets(&self) -> Vec<String>;

    /// What state are we in?
    fn state(&self) -> ChannelState;

    /// Start up underlying connections.
    async fn start(&mut self) -> Result<(), PluginError>;

    /// Wait for the next incoming message.
    /// Returns Err once the transport is gone for good.
    async fn receive_message(&mut self) -> Result<ChannelMessage, PluginError>;

    /// Push a message out. Replies use `session_id` to find the conversation.
    async fn send_message(&mut self, msg: ChannelMessage) -> Result<(), PluginError>;

    /// Close connections and stop taking new messages.
    async fn stop(&mut self) -> Result<(), PluginError>;
}

/// Errors that a ChannelPlugin implementation can return.
#[derive(Error, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub enum PluginError {
    /// Something went wrong sending or receiving JSON.
    #[error("JSON error: {0}")]
    Json(String),

    /// The plugin is not in a state where this operation is valid.
    #[error("invalid state for this operation")]
    InvalidState,

    /// Credentials are missing or were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The upstream connection could not be opened or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A timeout occurred.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// The plugin returned an unspecified failure.
    #[error("plugin error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> PluginError {
        PluginError::Json(err.to_string())
    }
}
