use std::collections::HashMap;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Transport-neutral chat message exchanged between a channel plugin and the host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct ChannelMessage {
    pub id: String,                       // Unique ID (UUID or channel-provided)
    pub session_id: Option<String>,       // Conversation the message belongs to (e.g. a Slack channel id)
    pub direction: MessageDirection,      // Incoming or Outgoing
    pub timestamp: DateTime<Utc>,         // When it was sent or received
    pub channel: String,                  // Slack, Telegram, Email, etc.
    pub from: Participant,                // Sender info
    pub to: Vec<Participant>,             // Recipient(s)

    pub content: Option<MessageContent>,  // Text or event
    pub thread_id: Option<String>,        // For threading support
    pub reply_to_id: Option<String>,      // If replying to another message
    pub metadata: HashMap<String, Value>, // Channel-specific or custom data
}

impl ChannelMessage {
    /// Build an incoming text message as a plugin would hand it to the host.
    pub fn incoming_text(channel: &str, session_id: &str, from: Participant, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: Some(session_id.to_string()),
            direction: MessageDirection::Incoming,
            timestamp: Utc::now(),
            channel: channel.to_string(),
            from,
            content: Some(MessageContent::Text(text.into())),
            ..Default::default()
        }
    }

    /// The text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Build the outgoing reply to this message.
    ///
    /// The reply stays in the same conversation and thread and is addressed
    /// to the original sender.
    pub fn reply(&self, text: impl Into<String>) -> ChannelMessage {
        ChannelMessage {
            id: Uuid::new_v4().to_string(),
            session_id: self.session_id.clone(),
            direction: MessageDirection::Outgoing,
            timestamp: Utc::now(),
            channel: self.channel.clone(),
            from: Participant::default(),
            to: vec![self.from.clone()],
            content: Some(MessageContent::Text(text.into())),
            thread_id: self.thread_id.clone(),
            reply_to_id: Some(self.id.clone()),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum MessageDirection {
    #[default]
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct Participant {
    pub id: String,                          // Internal or platform-specific ID
    pub display_name: Option<String>,        // Optional for SMS, Email
    pub channel_specific_id: Option<String>, // E.g., phone number, email, handle
}

impl Participant {
    pub fn new(id: String, display_name: Option<String>, channel_specific_id: Option<String>) -> Self {
        Self { id, display_name, channel_specific_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub enum MessageContent {
    Text(String),
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub event_payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventType {
    pub event_type: String,            // e.g., "message", "app_mention"
    pub description: String,           // Human-readable description
    pub payload_schema: Option<Value>, // the json schema for the event_payload
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ChannelCapabilities {
    pub name: String, // e.g. "slack", "mock"
    pub supports_sending: bool,
    pub supports_receiving: bool,
    pub supports_text: bool,
    pub supports_events: bool,
    pub supports_threading: bool,

    pub supported_events: Vec<EventType>, // List of events with descriptions
}
