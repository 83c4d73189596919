use crate::config::Settings;
use crate::delivery::RetryPolicy;
use crate::domain::contract::{SnapshotFeed, ValidatedFeed};
use crate::ingest::SnapshotSource;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

/// Snapshot feed over HTTP: `GET {base_url}{path}?as_of_date=YYYY-MM-DD`, answered with
/// `{as_of_date, items: [...]}`.
#[derive(Debug, Clone)]
pub struct HttpJsonSnapshotSource {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpJsonSnapshotSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = join_endpoint(
            settings.require_snapshot_provider_base_url()?,
            &settings.snapshot_provider_path,
        );

        let mut headers = HeaderMap::new();
        if let Some(key) = &settings.snapshot_provider_api_key {
            let mut value = HeaderValue::from_str(key).context("SNAPSHOT_PROVIDER_API_KEY is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.snapshot_provider_timeout_secs))
            .build()
            .context("failed to build snapshot provider http client")?;

        // 1s, 2s, 4s ... capped at a minute.
        let retry = RetryPolicy {
            max_attempts: settings.snapshot_provider_retries.max(1),
            base_delay_secs: 1.0,
            backoff_factor: 2.0,
            max_delay_secs: 60.0,
            attempt_timeout_secs: settings.snapshot_provider_timeout_secs.max(1) as f64,
        };

        Ok(Self { http, endpoint, retry })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, as_of_date: NaiveDate) -> Result<SnapshotFeed> {
        let res = self
            .http
            .get(&self.endpoint)
            .query(&[("as_of_date", as_of_date.format("%Y-%m-%d").to_string())])
            .send()
            .await
            .context("snapshot provider request failed")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("failed to read snapshot provider body")?;
        anyhow::ensure!(
            status.is_success(),
            "snapshot provider answered {status}: {}",
            excerpt(&body)
        );

        decode_feed(&body)
    }
}

fn join_endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        return base.to_string();
    }
    format!("{base}/{}", path.trim_start_matches('/'))
}

/// First 200 characters, for error messages.
fn excerpt(body: &str) -> &str {
    body.char_indices()
        .nth(200)
        .map_or(body, |(idx, _)| &body[..idx])
}

fn decode_feed(body: &str) -> Result<SnapshotFeed> {
    serde_json::from_str(body)
        .with_context(|| format!("snapshot provider body is not a snapshot feed: {}", excerpt(body)))
}

#[async_trait::async_trait]
impl SnapshotSource for HttpJsonSnapshotSource {
    fn source_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_snapshots(&self, as_of_date: NaiveDate) -> Result<ValidatedFeed> {
        for attempt in 1..=self.retry.max_attempts {
            match self.request(as_of_date).await {
                // Contract failures (wrong date, bad schema) are not transient.
                Ok(feed) => return feed.validate_and_into_snapshots(Some(as_of_date)),
                Err(err) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(attempt, ?delay, error = %format!("{err:#}"), "snapshot fetch failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "snapshot fetch gave up after {attempt} attempt(s)"
                    )))
                }
            }
        }
        anyhow::bail!("snapshot provider retry policy allows no attempts")
    }
}
