//! Slack channel plugin speaking Socket Mode.
//!
//! Incoming messages arrive over a WebSocket opened with the app-level token;
//! replies go out through `chat.postMessage` with the bot token.

pub mod socket_mode;
pub mod web_api;

use async_trait::async_trait;
use channel_plugin::{
    message::{ChannelCapabilities, ChannelMessage, EventType},
    plugin::{ChannelPlugin, ChannelState, PluginError},
};
use dashmap::DashMap;
use tokio::{
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{socket_mode::SocketModeReader, web_api::SlackWebApi};
pub use web_api::DEFAULT_SLACK_API_URL;

pub const BOT_TOKEN_SECRET: &str = "MY_SLACK_BOT_TKN";
pub const APP_TOKEN_SECRET: &str = "MY_SLACK_APP_TKN";
pub const API_URL_CONFIG: &str = "SLACK_API_URL";

pub struct SlackPlugin {
    state: ChannelState,
    config: DashMap<String, String>,
    secrets: DashMap<String, String>,
    api: Option<SlackWebApi>,
    bot_token: Option<String>,
    incoming_rx: Option<UnboundedReceiver<Result<ChannelMessage, PluginError>>>,
    shutdown: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl Default for SlackPlugin {
    fn default() -> Self {
        SlackPlugin {
            state: ChannelState::Stopped,
            config: DashMap::new(),
            secrets: DashMap::new(),
            api: None,
            bot_token: None,
            incoming_rx: None,
            shutdown: CancellationToken::new(),
            reader: None,
        }
    }
}

impl SlackPlugin {
    fn secret(&self, key: &str) -> Result<String, PluginError> {
        self.secrets
            .get(key)
            .map(|v| v.value().trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PluginError::Auth(format!("secret {key} is not set")))
    }

    fn api_url(&self) -> String {
        self.config
            .get(API_URL_CONFIG)
            .map(|v| v.value().clone())
            .unwrap_or_else(|| DEFAULT_SLACK_API_URL.to_string())
    }
}

#[async_trait]
impl ChannelPlugin for SlackPlugin {
    fn name(&self) -> String {
        "slack".to_string()
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            name: "slack".to_string(),
            supports_sending: true,
            supports_receiving: true,
            supports_text: true,
            supports_events: false,
            supports_threading: true,
            supported_events: vec![EventType {
                event_type: "message".into(),
                description: "A user posted a message in a conversation the bot is in".into(),
                payload_schema: None,
            }],
        }
    }

    fn set_config(&mut self, config: DashMap<String, String>) {
        self.config = config;
    }

    fn list_config(&self) -> Vec<String> {
        vec![API_URL_CONFIG.to_string()]
    }

    fn set_secrets(&mut self, secrets: DashMap<String, String>) {
        self.secrets = secrets;
    }

    fn list_secrets(&self) -> Vec<String> {
        vec![BOT_TOKEN_SECRET.to_string(), APP_TOKEN_SECRET.to_string()]
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        if self.state == ChannelState::Running {
            return Ok(());
        }
        self.state = ChannelState::Starting;
        let bot_token = self.secret(BOT_TOKEN_SECRET)?;
        let app_token = self.secret(APP_TOKEN_SECRET)?;

        let api = SlackWebApi::new(self.api_url());
        let url = api.open_connection(&app_token).await?;
        info!(api = api.base_url(), "slack socket mode connection opened");

        let (tx, rx) = unbounded_channel();
        self.shutdown = CancellationToken::new();
        let reader = SocketModeReader {
            api: api.clone(),
            app_token,
            incoming: tx,
            shutdown: self.shutdown.clone(),
        };
        self.reader = Some(tokio::spawn(reader.run(url)));
        self.incoming_rx = Some(rx);
        self.api = Some(api);
        self.bot_token = Some(bot_token);
        self.state = ChannelState::Running;
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<ChannelMessage, PluginError> {
        let rx = self.incoming_rx.as_mut().ok_or(PluginError::InvalidState)?;
        match rx.recv().await {
            Some(result) => result,
            None => Err(PluginError::Connection("slack reader stopped".into())),
        }
    }

    async fn send_message(&mut self, msg: ChannelMessage) -> Result<(), PluginError> {
        let (Some(api), Some(token)) = (&self.api, &self.bot_token) else {
            return Err(PluginError::InvalidState);
        };
        let channel = msg
            .session_id
            .as_deref()
            .ok_or_else(|| PluginError::Other("message has no conversation to reply to".into()))?;
        let text = msg
            .text()
            .ok_or_else(|| PluginError::Other("No content to send".into()))?;
        api.post_message(token, channel, text, msg.thread_id.as_deref()).await
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        self.state = ChannelState::Draining;
        self.shutdown.cancel();
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!(error = %e, "slack reader ended abnormally");
            }
        }
        self.incoming_rx = None;
        self.api = None;
        self.bot_token = None;
        self.state = ChannelState::Stopped;
        Ok(())
    }
}

impl Drop for SlackPlugin {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_without_tokens_is_an_auth_error() {
        let mut plugin = SlackPlugin::default();
        let err = plugin.start().await.unwrap_err();
        assert!(matches!(err, PluginError::Auth(ref m) if m.contains(BOT_TOKEN_SECRET)));
        assert_ne!(plugin.state(), ChannelState::Running);
    }

    #[tokio::test]
    async fn start_with_only_bot_token_names_app_token() {
        let mut plugin = SlackPlugin::default();
        let secrets = DashMap::new();
        secrets.insert(BOT_TOKEN_SECRET.to_string(), "xoxb-1".to_string());
        plugin.set_secrets(secrets);
        let err = plugin.start().await.unwrap_err();
        assert!(matches!(err, PluginError::Auth(ref m) if m.contains(APP_TOKEN_SECRET)));
    }

    #[tokio::test]
    async fn receive_and_send_before_start_are_invalid() {
        let mut plugin = SlackPlugin::default();
        assert_eq!(plugin.receive_message().await.unwrap_err(), PluginError::InvalidState);
        let msg = ChannelMessage::default();
        assert_eq!(plugin.send_message(msg).await.unwrap_err(), PluginError::InvalidState);
    }

    #[test]
    fn lists_tokens_and_api_url() {
        let plugin = SlackPlugin::default();
        assert_eq!(plugin.list_secrets(), vec![BOT_TOKEN_SECRET, APP_TOKEN_SECRET]);
        assert_eq!(plugin.list_config(), vec![API_URL_CONFIG]);
        assert_eq!(plugin.api_url(), DEFAULT_SLACK_API_URL);
    }
}
