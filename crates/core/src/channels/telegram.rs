use crate::channels::line::truncate_chars;
use crate::delivery::{Channel, Notification};
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TEXT_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct TelegramChannel {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build Telegram http client")?;
        Ok(Self {
            http,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn url(&self) -> String {
        format!("{API_BASE}/bot{}/sendMessage", self.bot_token)
    }

    fn payload(&self, notification: &Notification) -> serde_json::Value {
        let text = format!("{}\n\n{}", notification.subject, notification.body_text);
        serde_json::json!({
            "chat_id": self.chat_id,
            "text": truncate_chars(&text, MAX_TEXT_CHARS),
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait::async_trait]
impl Channel for TelegramChannel {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.url())
            .json(&self.payload(notification))
            .send()
            .await
            // The URL embeds the bot token; keep it out of the error chain.
            .map_err(|e| anyhow::anyhow!("Telegram request failed: {}", e.without_url()))?;

        let status = res.status();
        let body: ApiResponse = res
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram response unreadable (HTTP {status}): {}", e.without_url()))?;
        if !body.ok {
            anyhow::bail!(
                "Telegram sendMessage failed (HTTP {status}): {}",
                body.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}
