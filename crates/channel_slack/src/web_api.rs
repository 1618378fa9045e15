use channel_plugin::plugin::PluginError;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Every Web API reply carries `ok`, and `error` when `ok` is false.
#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// The two Web API calls the Socket Mode client needs.
#[derive(Debug, Clone)]
pub struct SlackWebApi {
    client: reqwest::Client,
    base_url: String,
}

impl SlackWebApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `apps.connections.open`: trade the app-level token for a WebSocket URL.
    pub async fn open_connection(&self, app_token: &str) -> Result<String, PluginError> {
        let reply = self.call("apps.connections.open", app_token, &json!({})).await?;
        if !reply.ok {
            let error = reply.error.unwrap_or_else(|| "unknown_error".into());
            return Err(match error.as_str() {
                "invalid_auth" | "not_authed" | "account_inactive" => PluginError::Auth(error),
                _ => PluginError::Connection(format!("apps.connections.open failed: {error}")),
            });
        }
        reply
            .url
            .ok_or_else(|| PluginError::Connection("apps.connections.open returned no url".into()))
    }

    /// `chat.postMessage`, optionally inside a thread.
    pub async fn post_message(
        &self,
        bot_token: &str,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), PluginError> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::String(ts.to_string());
        }
        let reply = self.call("chat.postMessage", bot_token, &body).await?;
        if reply.ok {
            Ok(())
        } else {
            Err(PluginError::Other(reply.error.unwrap_or_else(|| "unknown_error".into())))
        }
    }

    async fn call(&self, method: &str, token: &str, body: &Value) -> Result<ApiReply, PluginError> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(%url, "slack web api call");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| PluginError::Connection(format!("{method}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PluginError::Connection(format!("{method}: HTTP {status}")));
        }
        resp.json::<ApiReply>()
            .await
            .map_err(|e| PluginError::Json(format!("{method}: {e}")))
    }
}
