use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel}};

use crate::{
    message::{ChannelCapabilities, ChannelMessage},
    plugin::{ChannelPlugin, ChannelState, PluginError},
};

/// In-memory channel for tests.
///
/// Clones share the same queues, so a test can keep one handle to inject
/// messages and inspect replies while the host owns the other.
#[derive(Clone)]
pub struct MockChannel {
    in_tx: Arc<Mutex<Option<UnboundedSender<ChannelMessage>>>>,
    in_rx: Arc<Mutex<UnboundedReceiver<ChannelMessage>>>,
    outgoing: Arc<Mutex<Vec<ChannelMessage>>>,
    state: Arc<Mutex<ChannelState>>,
    fail_sends: Arc<AtomicBool>,
    config: DashMap<String, String>,
    secrets: DashMap<String, String>,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    pub fn new() -> Self {
        let (in_tx, in_rx) = unbounded_channel();
        Self {
            in_tx: Arc::new(Mutex::new(Some(in_tx))),
            in_rx: Arc::new(Mutex::new(in_rx)),
            outgoing: Arc::new(Mutex::new(vec![])),
            state: Arc::new(Mutex::new(ChannelState::Stopped)),
            fail_sends: Arc::new(AtomicBool::new(false)),
            config: DashMap::new(),
            secrets: DashMap::new(),
        }
    }

    /// Inject an incoming message and wake any pollers.
    pub async fn inject(&self, msg: ChannelMessage) {
        if let Some(tx) = self.in_tx.lock().await.as_ref() {
            let _ = tx.send(msg);
        }
    }

    /// Drop the inbound side. Once drained, `receive_message` fails with `Connection`.
    pub async fn close(&self) {
        self.in_tx.lock().await.take();
    }

    /// Make every following `send_message` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<ChannelMessage> {
        self.outgoing.lock().await.clone()
    }
}

#[async_trait]
impl ChannelPlugin for MockChannel {
    fn name(&self) -> String {
        "mock".to_string()
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            name: "mock".to_string(),
            supports_sending: true,
            supports_receiving: true,
            supports_text: true,
            supports_events: false,
            supports_threading: true,
            supported_events: vec![],
        }
    }

    fn set_config(&mut self, config: DashMap<String, String>) {
        self.config = config;
    }

    fn list_config(&self) -> Vec<String> {
        vec![]
    }

    fn set_secrets(&mut self, secrets: DashMap<String, String>) {
        self.secrets = secrets;
    }

    fn list_secrets(&self) -> Vec<String> {
        vec![]
    }

    fn state(&self) -> ChannelState {
        self.state.try_lock().map(|s| *s).unwrap_or(ChannelState::Starting)
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        *self.state.lock().await = ChannelState::Running;
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<ChannelMessage, PluginError> {
        self.in_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| PluginError::Connection("mock channel closed".into()))
    }

    async fn send_message(&mut self, msg: ChannelMessage) -> Result<(), PluginError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PluginError::Other("mock send failure".into()));
        }
        self.outgoing.lock().await.push(msg);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        *self.state.lock().await = ChannelState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Participant;

    #[tokio::test]
    async fn inject_then_receive_and_record_sends() {
        let mock = MockChannel::new();
        let mut host = mock.clone();
        host.start().await.unwrap();
        assert_eq!(host.state(), ChannelState::Running);

        let msg = ChannelMessage::incoming_text("mock", "room", Participant::default(), "hi");
        mock.inject(msg.clone()).await;
        let got = host.receive_message().await.unwrap();
        assert_eq!(got.id, msg.id);

        host.send_message(got.reply("ok")).await.unwrap();
        assert_eq!(mock.sent_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn closed_mock_reports_connection_error() {
        let mock = MockChannel::new();
        let mut host = mock.clone();
        mock.close().await;
        let err = host.receive_message().await.unwrap_err();
        assert!(matches!(err, PluginError::Connection(_)));
    }

    #[tokio::test]
    async fn failing_sends_are_not_recorded() {
        let mock = MockChannel::new();
        let mut host = mock.clone();
        mock.fail_sends(true);
        let msg = ChannelMessage::incoming_text("mock", "room", Participant::default(), "hi");
        assert!(host.send_message(msg.reply("x")).await.is_err());
        assert!(mock.sent_messages().await.is_empty());
    }
}
