//! Chat side channel: a listener that answers every message.

pub mod handler;
pub mod listener;

pub use handler::{ACK_TEXT, AcknowledgeHandler, MessageHandler};
pub use listener::{ChannelListener, ListenerError, ListenerStats};
