use std::sync::Arc;

use channel_plugin::plugin::{ChannelPlugin, PluginError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::MessageHandler;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("channel `{channel}` failed to start")]
    Start {
        channel: String,
        #[source]
        source: PluginError,
    },
    #[error("channel `{channel}` stopped delivering messages")]
    Receive {
        channel: String,
        #[source]
        source: PluginError,
    },
}

/// Counters reported when the listener stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub replied: u64,
    pub failed_replies: u64,
}

/// Owns one channel plugin and answers its messages with one handler.
pub struct ChannelListener {
    plugin: Box<dyn ChannelPlugin>,
    handler: Arc<dyn MessageHandler>,
    stats: ListenerStats,
}

enum Next {
    Shutdown,
    Received(Result<channel_plugin::message::ChannelMessage, PluginError>),
}

impl ChannelListener {
    pub fn new(plugin: Box<dyn ChannelPlugin>, handler: Arc<dyn MessageHandler>) -> Self {
        Self { plugin, handler, stats: ListenerStats::default() }
    }

    /// Start the plugin and reply to messages until `shutdown` fires or the
    /// plugin stops delivering. A failed reply is logged and skipped.
    #[tracing::instrument(name = "channel_listener", skip_all, fields(channel = %self.plugin.name()))]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ListenerStats, ListenerError> {
        let channel = self.plugin.name();
        self.plugin
            .start()
            .await
            .map_err(|source| ListenerError::Start { channel: channel.clone(), source })?;
        info!("listening for messages");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => Next::Shutdown,
                received = self.plugin.receive_message() => Next::Received(received),
            };

            let msg = match next {
                Next::Shutdown => {
                    self.stop_plugin().await;
                    info!(stats = ?self.stats, "listener stopped");
                    return Ok(self.stats);
                }
                Next::Received(Ok(msg)) => msg,
                Next::Received(Err(source)) => {
                    error!(error = %source, "receive failed");
                    self.stop_plugin().await;
                    return Err(ListenerError::Receive { channel, source });
                }
            };

            self.stats.received += 1;
            debug!(id = %msg.id, session = ?msg.session_id, "message received");
            let Some(reply) = self.handler.handle_incoming(&msg).await else {
                continue;
            };
            match self.plugin.send_message(reply).await {
                Ok(()) => self.stats.replied += 1,
                Err(e) => {
                    self.stats.failed_replies += 1;
                    warn!(error = %e, session = ?msg.session_id, "could not send reply");
                }
            }
        }
    }

    async fn stop_plugin(&mut self) {
        if let Err(e) = self.plugin.stop().await {
            warn!(error = %e, "channel did not stop cleanly");
        }
    }
}
