use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{Json, Router, extract::State, routing::post};
use channel_plugin::plugin::{ChannelPlugin, ChannelState, PluginError};
use channel_slack::{
    API_URL_CONFIG, APP_TOKEN_SECRET, BOT_TOKEN_SECRET, SlackPlugin, socket_mode::RECONNECT_BASE_DELAY,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    net::TcpListener,
    sync::{Mutex, mpsc},
    time::timeout,
};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMsg};

#[derive(Clone)]
struct MockSlack {
    socket_url: String,
    posted: Arc<Mutex<Vec<Value>>>,
    post_error: Option<&'static str>,
    opened: Arc<Mutex<Vec<Instant>>>,
}

impl MockSlack {
    fn new(socket_url: String) -> Self {
        Self { socket_url, posted: Arc::default(), post_error: None, opened: Arc::default() }
    }
}

async fn open_connection(State(mock): State<MockSlack>) -> Json<Value> {
    mock.opened.lock().await.push(Instant::now());
    Json(json!({ "ok": true, "url": mock.socket_url }))
}

async fn post_message(State(mock): State<MockSlack>, Json(body): Json<Value>) -> Json<Value> {
    if let Some(error) = mock.post_error {
        return Json(json!({ "ok": false, "error": error }));
    }
    mock.posted.lock().await.push(body);
    Json(json!({ "ok": true, "ts": "9.9" }))
}

/// Socket server that sends `frames` once connected and forwards every ack it reads.
async fn spawn_socket(frames: Vec<Value>) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(WsMsg::Text(frame.to_string().into())).await.unwrap();
        }
        while let Some(Ok(msg)) = ws.next().await {
            if let WsMsg::Text(text) = msg {
                let _ = ack_tx.send(serde_json::from_str::<Value>(text.as_str()).unwrap());
            }
        }
    });
    (format!("ws://{addr}/socket"), ack_rx)
}

async fn spawn_web_api(mock: MockSlack) -> String {
    let app = Router::new()
        .route("/apps.connections.open", post(open_connection))
        .route("/chat.postMessage", post(post_message))
        .with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn plugin_for(api_url: &str) -> SlackPlugin {
    let mut plugin = SlackPlugin::default();
    let config = DashMap::new();
    config.insert(API_URL_CONFIG.to_string(), api_url.to_string());
    let secrets = DashMap::new();
    secrets.insert(BOT_TOKEN_SECRET.to_string(), "xoxb-test".to_string());
    secrets.insert(APP_TOKEN_SECRET.to_string(), "xapp-test".to_string());
    plugin.set_config(config);
    plugin.set_secrets(secrets);
    plugin
}

fn user_message(envelope_id: &str, text: &str) -> Value {
    json!({
        "type": "events_api",
        "envelope_id": envelope_id,
        "payload": { "event": {
            "type": "message", "channel": "C1", "user": "U1",
            "text": text, "ts": "1700000000.000100"
        }}
    })
}

#[tokio::test]
async fn acknowledges_envelopes_delivers_message_and_posts_reply() {
    let bot_echo = json!({
        "type": "events_api",
        "envelope_id": "env-bot",
        "payload": { "event": { "type": "message", "channel": "C1", "bot_id": "B1", "text": "echo" }}
    });
    let (socket_url, mut acks) = spawn_socket(vec![
        json!({ "type": "hello" }),
        bot_echo,
        user_message("env-user", "hello bot"),
    ])
    .await;
    let mock = MockSlack::new(socket_url);
    let posted = mock.posted.clone();
    let api_url = spawn_web_api(mock).await;

    let mut plugin = plugin_for(&api_url);
    plugin.start().await.unwrap();
    assert_eq!(plugin.state(), ChannelState::Running);

    let msg = timeout(Duration::from_secs(5), plugin.receive_message())
        .await
        .expect("no message within timeout")
        .unwrap();
    assert_eq!(msg.text(), Some("hello bot"));
    assert_eq!(msg.session_id.as_deref(), Some("C1"));

    let first = timeout(Duration::from_secs(5), acks.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), acks.recv()).await.unwrap().unwrap();
    assert_eq!(first, json!({ "envelope_id": "env-bot" }));
    assert_eq!(second, json!({ "envelope_id": "env-user" }));

    plugin.send_message(msg.reply("got it")).await.unwrap();
    let posted = posted.lock().await.clone();
    assert_eq!(posted, vec![json!({ "channel": "C1", "text": "got it" })]);

    plugin.stop().await.unwrap();
    assert_eq!(plugin.state(), ChannelState::Stopped);
}

#[tokio::test]
async fn slack_error_on_post_is_reported() {
    let (socket_url, _acks) = spawn_socket(vec![user_message("env-1", "hi")]).await;
    let mock = MockSlack { post_error: Some("channel_not_found"), ..MockSlack::new(socket_url) };
    let api_url = spawn_web_api(mock).await;

    let mut plugin = plugin_for(&api_url);
    plugin.start().await.unwrap();
    let msg = timeout(Duration::from_secs(5), plugin.receive_message()).await.unwrap().unwrap();
    let err = plugin.send_message(msg.reply("x")).await.unwrap_err();
    assert_eq!(err, PluginError::Other("channel_not_found".into()));
    plugin.stop().await.unwrap();
}

#[tokio::test]
async fn unreachable_api_fails_start_with_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut plugin = plugin_for(&format!("http://{addr}"));
    let err = plugin.start().await.unwrap_err();
    assert!(matches!(err, PluginError::Connection(_)), "{err:?}");
}

/// Socket server whose first connection is told to disconnect before `hello`;
/// the second one delivers a message.
async fn spawn_flaky_socket() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut first = accept_async(stream).await.unwrap();
        first
            .send(WsMsg::Text(
                json!({ "type": "disconnect", "reason": "refresh_requested" }).to_string().into(),
            ))
            .await
            .unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut second = accept_async(stream).await.unwrap();
        second.send(WsMsg::Text(json!({ "type": "hello" }).to_string().into())).await.unwrap();
        second
            .send(WsMsg::Text(user_message("env-2", "after reconnect").to_string().into()))
            .await
            .unwrap();
        while let Some(Ok(_)) = second.next().await {}
        drop(first);
    });
    format!("ws://{addr}/socket")
}

#[tokio::test]
async fn disconnect_reopens_connection_after_a_pause() {
    let mock = MockSlack::new(spawn_flaky_socket().await);
    let opened = mock.opened.clone();
    let api_url = spawn_web_api(mock).await;

    let mut plugin = plugin_for(&api_url);
    plugin.start().await.unwrap();
    let msg = timeout(Duration::from_secs(5), plugin.receive_message()).await.unwrap().unwrap();
    assert_eq!(msg.text(), Some("after reconnect"));

    let opened = opened.lock().await.clone();
    assert_eq!(opened.len(), 2);
    assert!(opened[1] - opened[0] >= RECONNECT_BASE_DELAY);
    plugin.stop().await.unwrap();
}
