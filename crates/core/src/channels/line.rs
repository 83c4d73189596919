use crate::delivery::{Channel, Notification};
use anyhow::Context;
use std::time::Duration;

const PUSH_URL: &str = "https://api.line.me/v2/bot/message/push";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// LINE rejects text messages over 5000 characters.
pub const MAX_TEXT_CHARS: usize = 4900;

#[derive(Debug, Clone)]
pub struct LineChannel {
    http: reqwest::Client,
    access_token: String,
    user_id: String,
}

impl LineChannel {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build LINE http client")?;
        Ok(Self {
            http,
            access_token: access_token.into(),
            user_id: user_id.into(),
        })
    }

    fn payload(&self, notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "to": self.user_id,
            "messages": [{"type": "text", "text": message_text(notification)}],
        })
    }
}

pub(crate) fn message_text(notification: &Notification) -> String {
    let full = format!("{}\n\n{}", notification.subject, notification.body_text);
    truncate_chars(&full, MAX_TEXT_CHARS)
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[async_trait::async_trait]
impl Channel for LineChannel {
    fn id(&self) -> &str {
        "line"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let res = self
            .http
            .post(PUSH_URL)
            .bearer_auth(&self.access_token)
            .json(&self.payload(notification))
            .send()
            .await
            .context("LINE push request failed")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("LINE push HTTP {status}: {text}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_messages_are_truncated_on_char_boundaries() {
        let note = Notification::text("主題", "股".repeat(6000));
        let text = message_text(&note);
        assert_eq!(text.chars().count(), MAX_TEXT_CHARS);
        assert!(text.starts_with("主題\n\n股"));
    }

    #[test]
    fn payload_targets_configured_user() {
        let ch = LineChannel::new("token", "U123").unwrap();
        let v = ch.payload(&Notification::text("s", "b"));
        assert_eq!(v["to"], "U123");
        assert_eq!(v["messages"][0]["type"], "text");
        assert_eq!(v["messages"][0]["text"], "s\n\nb");
    }
}
