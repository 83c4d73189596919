use crate::delivery::{DeliveryHealthTracker, DeliveryOrchestrator, DeliveryOutcome, Notification};
use crate::time::tw_market::taipei_offset;
use chrono::{DateTime, Duration, Offset, Utc};
use std::fmt::Write;

const SUBJECT: &str = "系統心跳檢測";

#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatResult {
    /// The last successful heartbeat is younger than the interval; nothing was sent.
    Suppressed { last: DateTime<Utc> },
    Sent(DeliveryOutcome),
}

/// Sends a liveness message through the orchestrator at most once per interval.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval_secs: u64) -> Self {
        let secs = i64::try_from(interval_secs).unwrap_or(i64::MAX).min(365 * 24 * 3600);
        Self {
            interval: Duration::seconds(secs),
        }
    }

    pub fn is_due(&self, health: &DeliveryHealthTracker, now: DateTime<Utc>) -> bool {
        health
            .last_heartbeat()
            .map_or(true, |last| now - last >= self.interval)
    }

    pub async fn beat(&self, orch: &mut DeliveryOrchestrator, now: DateTime<Utc>) -> HeartbeatResult {
        if !self.is_due(orch.health(), now) {
            if let Some(last) = orch.health().last_heartbeat() {
                tracing::debug!(%last, "heartbeat suppressed");
                return HeartbeatResult::Suppressed { last };
            }
        }

        let ids: Vec<String> = orch.channel_ids().map(str::to_string).collect();
        let note = heartbeat_message(orch.health(), &ids, now);
        let outcome = orch.deliver_at(&note, now).await;
        if outcome.overall_success {
            orch.health_mut().record_heartbeat(now);
        }
        HeartbeatResult::Sent(outcome)
    }
}

fn heartbeat_message(health: &DeliveryHealthTracker, channel_ids: &[String], now: DateTime<Utc>) -> Notification {
    let offset = taipei_offset().unwrap_or_else(|_| Utc.fix());
    let mut body = String::new();
    let _ = writeln!(body, "此為系統心跳檢測通知");
    let _ = writeln!(
        body,
        "檢測時間: {}\n",
        now.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(body, "通道狀態:");

    for id in channel_ids {
        match health.status(id) {
            Some(s) => {
                let mark = if s.available && s.consecutive_failures < 3 { "✅" } else { "⚠️" };
                let _ = writeln!(
                    body,
                    "  {mark} {id}: 上次成功 {}, 連續失敗 {} 次",
                    ago(s.last_success, now),
                    s.consecutive_failures
                );
            }
            None => {
                let _ = writeln!(body, "  ✅ {id}: 尚未使用");
            }
        }
    }

    let _ = writeln!(body, "\n未送達通知數: {}", health.undelivered_count());
    Notification::text(SUBJECT, body)
}

fn ago(when: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(when) = when else {
        return "從未成功".to_string();
    };
    let secs = (now - when).num_seconds().max(0);
    if secs < 3600 {
        format!("{} 分鐘前", secs / 60)
    } else {
        format!("{:.1} 小時前", secs as f64 / 3600.0)
    }
}
