use async_trait::async_trait;
use channel_plugin::message::ChannelMessage;

/// Fixed acknowledgment sent back for every inbound message.
pub const ACK_TEXT: &str = "📄 *Here's what I found:*\nwelcom";

/// Turns one inbound message into an optional reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_incoming(&self, msg: &ChannelMessage) -> Option<ChannelMessage>;
}

/// Answers every message with [`ACK_TEXT`], whatever it says.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeHandler;

#[async_trait]
impl MessageHandler for AcknowledgeHandler {
    async fn handle_incoming(&self, msg: &ChannelMessage) -> Option<ChannelMessage> {
        Some(msg.reply(ACK_TEXT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_plugin::message::{MessageContent, Participant};

    #[tokio::test]
    async fn every_message_gets_the_same_ack() {
        let handler = AcknowledgeHandler;
        for text in ["hello", "", "what is rust?"] {
            let msg = ChannelMessage::incoming_text("slack", "C1", Participant::default(), text);
            let reply = handler.handle_incoming(&msg).await.unwrap();
            assert_eq!(reply.text(), Some(ACK_TEXT));
            assert_eq!(reply.session_id.as_deref(), Some("C1"));
        }
    }

    #[tokio::test]
    async fn non_text_messages_are_acknowledged_too() {
        let msg = ChannelMessage {
            session_id: Some("D1".into()),
            content: None::<MessageContent>,
            ..Default::default()
        };
        let reply = AcknowledgeHandler.handle_incoming(&msg).await.unwrap();
        assert!(reply.text().unwrap().contains("Here's what I found"));
    }
}
