use std::{collections::HashMap, time::Duration};

use channel_plugin::{
    message::{ChannelMessage, MessageContent, MessageDirection, Participant},
    plugin::PluginError,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMsg};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::web_api::SlackWebApi;

/// Pause before reopening a connection Slack closed.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(250);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Subtypes that are edits, deletions or bot echoes rather than new user messages.
const SKIPPED_SUBTYPES: &[&str] = &["bot_message", "message_changed", "message_deleted"];

/// One Socket Mode frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Envelope, PluginError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The acknowledgment Slack expects for this envelope, if it needs one.
    pub fn ack(&self) -> Option<String> {
        self.envelope_id
            .as_ref()
            .map(|id| json!({ "envelope_id": id }).to_string())
    }

    /// Convert an `events_api` message event into an incoming `ChannelMessage`.
    ///
    /// Returns `None` for every other envelope, and for bot-authored or
    /// edited/deleted messages.
    pub fn to_message(&self) -> Option<ChannelMessage> {
        if self.kind != "events_api" {
            return None;
        }
        let event = self.payload.as_ref()?.get("event")?;
        if event.get("type").and_then(Value::as_str) != Some("message") {
            return None;
        }
        if event.get("bot_id").is_some() {
            return None;
        }
        if let Some(subtype) = event.get("subtype").and_then(Value::as_str) {
            if SKIPPED_SUBTYPES.contains(&subtype) {
                return None;
            }
        }

        let field = |name: &str| event.get(name).and_then(Value::as_str).map(str::to_string);
        let channel = field("channel")?;
        let user = field("user").unwrap_or_default();
        let ts = field("ts");

        let mut metadata = HashMap::new();
        if let Some(ts) = &ts {
            metadata.insert("ts".to_string(), Value::String(ts.clone()));
        }
        if let Some(team) = self.payload.as_ref().and_then(|p| p.get("team_id")).cloned() {
            metadata.insert("team_id".to_string(), team);
        }

        Some(ChannelMessage {
            id: ts.unwrap_or_else(|| self.envelope_id.clone().unwrap_or_default()),
            session_id: Some(channel),
            direction: MessageDirection::Incoming,
            timestamp: Utc::now(),
            channel: "slack".into(),
            from: Participant::new(user.clone(), None, Some(user)),
            to: vec![],
            content: Some(MessageContent::Text(field("text").unwrap_or_default())),
            thread_id: field("thread_ts"),
            reply_to_id: None,
            metadata,
        })
    }
}

/// Doubles with every reconnect in a row that never saw `hello`, capped at
/// [`RECONNECT_MAX_DELAY`].
pub fn reconnect_delay(failed_in_a_row: u32) -> Duration {
    RECONNECT_BASE_DELAY
        .saturating_mul(1 << failed_in_a_row.min(8))
        .min(RECONNECT_MAX_DELAY)
}

enum SessionEnd {
    Shutdown,
    /// `ready` is set once the session got its `hello`.
    Reconnect { ready: bool },
}

/// Reads Socket Mode frames and feeds messages to the plugin's inbound queue.
pub(crate) struct SocketModeReader {
    pub(crate) api: SlackWebApi,
    pub(crate) app_token: String,
    pub(crate) incoming: UnboundedSender<Result<ChannelMessage, PluginError>>,
    pub(crate) shutdown: CancellationToken,
}

impl SocketModeReader {
    /// Runs until shutdown, the inbound queue is dropped, or the transport fails.
    /// A transport failure is forwarded to the queue before returning.
    pub(crate) async fn run(self, first_url: String) {
        let mut next_url = Some(first_url);
        let mut failed_in_a_row = 0;
        loop {
            let url = match next_url.take() {
                Some(url) => url,
                None => match self.api.open_connection(&self.app_token).await {
                    Ok(url) => url,
                    Err(e) => {
                        let _ = self.incoming.send(Err(e));
                        return;
                    }
                },
            };

            match self.session(&url).await {
                Ok(SessionEnd::Shutdown) => return,
                Ok(SessionEnd::Reconnect { ready }) => {
                    if ready {
                        failed_in_a_row = 0;
                    }
                    let delay = reconnect_delay(failed_in_a_row);
                    failed_in_a_row = failed_in_a_row.saturating_add(1);
                    info!(delay_ms = delay.as_millis() as u64, "slack asked for a reconnect");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "slack socket mode connection lost");
                    let _ = self.incoming.send(Err(e));
                    return;
                }
            }
        }
    }

    async fn session(&self, url: &str) -> Result<SessionEnd, PluginError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| PluginError::Connection(format!("websocket connect: {e}")))?;
        let (mut write, mut read) = ws.split();
        debug!("slack socket connected");
        let mut ready = false;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = write.send(WsMsg::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = read.next() => {
                    let text = match frame {
                        None => return Err(PluginError::Connection("socket closed".into())),
                        Some(Err(e)) => return Err(PluginError::Connection(e.to_string())),
                        Some(Ok(WsMsg::Close(_))) => return Ok(SessionEnd::Reconnect { ready }),
                        Some(Ok(WsMsg::Text(text))) => text,
                        Some(Ok(_)) => continue,
                    };

                    let envelope = match Envelope::parse(text.as_str()) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(error = %e, "unparseable socket mode frame");
                            continue;
                        }
                    };
                    if let Some(ack) = envelope.ack() {
                        write
                            .send(WsMsg::Text(ack.into()))
                            .await
                            .map_err(|e| PluginError::Connection(format!("ack failed: {e}")))?;
                    }

                    match envelope.kind.as_str() {
                        "hello" => {
                            ready = true;
                            info!("slack socket mode ready");
                        }
                        "disconnect" => {
                            debug!(reason = ?envelope.reason, "disconnect envelope");
                            return Ok(SessionEnd::Reconnect { ready });
                        }
                        "events_api" => {
                            if let Some(msg) = envelope.to_message() {
                                if self.incoming.send(Ok(msg)).is_err() {
                                    return Ok(SessionEnd::Shutdown);
                                }
                            }
                        }
                        other => debug!(kind = other, "ignoring envelope"),
                    }
                }
            }
        }
    }
}
