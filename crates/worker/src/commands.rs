use anyhow::Context;
use chrono::Utc;
use std::path::PathBuf;
use stockbell_core::channels;
use stockbell_core::config::{EngineConfig, Settings};
use stockbell_core::delivery::{
    BackupStore, DeliveryOrchestrator, HeartbeatMonitor, HeartbeatResult,
};
use stockbell_core::ingest::{FileSnapshotSource, HttpJsonSnapshotSource, SnapshotSource};
use stockbell_core::pipeline::{run_slot, Engine, RunRequest};
use stockbell_core::report;
use stockbell_core::scoring::AnalysisType;
use stockbell_core::storage::{self, lock::RunLock};
use stockbell_core::time::{tw_market, TimeSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    DeliveryDegraded,
}

#[derive(Debug)]
pub struct RunArgs {
    pub slot: Option<TimeSlot>,
    pub as_of_date: Option<String>,
    pub analysis_type: Option<AnalysisType>,
    pub snapshots: Option<PathBuf>,
    pub dry_run: bool,
}

async fn orchestrator(settings: &Settings, config: &EngineConfig) -> anyhow::Result<DeliveryOrchestrator> {
    let health = storage::status::load(&settings.status_path(), config.delivery.health).await;
    let mut orch = DeliveryOrchestrator::new(config.delivery.retry, health)
        .with_backup(BackupStore::new(&settings.log_dir));
    for reg in channels::build_registrations(settings, &config.delivery.channels)? {
        orch.register(reg);
    }
    Ok(orch)
}

async fn save_health(settings: &Settings, orch: &DeliveryOrchestrator) {
    if let Err(err) = storage::status::save(&settings.status_path(), orch.health()).await {
        tracing::error!(error = %format!("{err:#}"), "failed to save delivery status");
    }
}

fn source(settings: &Settings, snapshots: Option<PathBuf>) -> anyhow::Result<Box<dyn SnapshotSource>> {
    Ok(match snapshots {
        Some(path) => Box::new(FileSnapshotSource::new(path)),
        None => Box::new(HttpJsonSnapshotSource::from_settings(settings)?),
    })
}

pub async fn run(settings: &Settings, config: &EngineConfig, args: RunArgs) -> anyhow::Result<Completion> {
    let now = Utc::now();

    let time_slot = match args.slot {
        Some(slot) => slot,
        None => match tw_market::resolve_time_slot(now)? {
            Some(slot) => slot,
            None => {
                tracing::info!("no time slot due; nothing to do");
                return Ok(Completion::Done);
            }
        },
    };
    let as_of_date = tw_market::resolve_as_of_date(args.as_of_date.as_deref(), now)?;

    let Some(_lock) = RunLock::try_acquire(&settings.data_dir.join("locks"), as_of_date, time_slot).await? else {
        tracing::warn!(%as_of_date, %time_slot, "run lock held; another run in progress");
        return Ok(Completion::Done);
    };

    let source = source(settings, args.snapshots)?;
    let feed = source
        .fetch_snapshots(as_of_date)
        .await
        .with_context(|| format!("failed to fetch snapshots from {}", source.source_name()))?;
    if feed.snapshots.is_empty() {
        tracing::warn!(%as_of_date, skipped = feed.skipped, "snapshot feed has no valid items; reporting an empty set");
    }
    tracing::info!(
        source = source.source_name(),
        snapshots = feed.snapshots.len(),
        skipped = feed.skipped,
        "snapshots fetched"
    );

    let engine = Engine::from_config(config);

    if args.dry_run {
        let analysis_type = args
            .analysis_type
            .unwrap_or_else(|| time_slot.default_analysis_type());
        let (set, skipped) = engine.analyze(&feed.snapshots, time_slot, analysis_type);
        storage::recommendations::persist(&settings.data_dir, as_of_date, &set, now).await?;
        tracing::info!(%time_slot, skipped, dry_run = true, "analysis finished; delivery skipped");
        println!("{}", report::render_text(&set, as_of_date));
        return Ok(Completion::Done);
    }

    let mut orch = orchestrator(settings, config).await?;
    let run_report = run_slot(
        &engine,
        &mut orch,
        &settings.data_dir,
        RunRequest {
            as_of_date,
            time_slot,
            analysis_type: args.analysis_type,
            snapshots: &feed.snapshots,
        },
        now,
    )
    .await;
    save_health(settings, &orch).await;

    Ok(if run_report.delivered() {
        Completion::Done
    } else {
        Completion::DeliveryDegraded
    })
}

pub async fn heartbeat(settings: &Settings, config: &EngineConfig) -> anyhow::Result<Completion> {
    let mut orch = orchestrator(settings, config).await?;
    let monitor = HeartbeatMonitor::new(config.delivery.heartbeat_interval_secs);

    let result = monitor.beat(&mut orch, Utc::now()).await;
    save_health(settings, &orch).await;

    Ok(match result {
        HeartbeatResult::Suppressed { last } => {
            tracing::info!(%last, "heartbeat not due");
            Completion::Done
        }
        HeartbeatResult::Sent(outcome) if outcome.overall_success => Completion::Done,
        HeartbeatResult::Sent(_) => Completion::DeliveryDegraded,
    })
}

pub async fn retry_undelivered(
    settings: &Settings,
    config: &EngineConfig,
    max_retries: u32,
) -> anyhow::Result<Completion> {
    let mut orch = orchestrator(settings, config).await?;
    let summary = orch.retry_undelivered(max_retries).await;
    save_health(settings, &orch).await;
    let summary = summary?;

    tracing::info!(
        found = summary.found,
        delivered = summary.delivered,
        exhausted = summary.exhausted,
        failed = summary.failed,
        "retry pass complete"
    );
    Ok(Completion::Done)
}

pub async fn status(settings: &Settings, config: &EngineConfig) -> anyhow::Result<Completion> {
    let health = storage::status::load(&settings.status_path(), config.delivery.health).await;
    let json = serde_json::to_string_pretty(&health).context("failed to render delivery status")?;
    println!("{json}");
    Ok(Completion::Done)
}

/// Best-effort urgent alert after a failed command. Falls back to the default engine config
/// when the configured one is what failed to load.
pub async fn notify_failure(settings: &Settings, command: &str, err: &anyhow::Error) {
    let config = match EngineConfig::load_or_default(settings.config_path.as_deref()) {
        Ok(config) => config,
        Err(cfg_err) => {
            tracing::warn!(error = %cfg_err, "engine config unusable; alerting with defaults");
            EngineConfig::default()
        }
    };
    let mut orch = match orchestrator(settings, &config).await {
        Ok(orch) => orch,
        Err(setup_err) => {
            tracing::error!(error = %format!("{setup_err:#}"), "cannot send failure alert");
            return;
        }
    };

    let alert = report::failure_alert(command, &format!("{err:#}"), Utc::now());
    let outcome = orch.deliver(&alert).await;
    save_health(settings, &orch).await;
    if !outcome.overall_success {
        tracing::error!("failure alert was not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn run_args(feed: PathBuf) -> RunArgs {
        RunArgs {
            slot: Some(TimeSlot::MorningScan),
            as_of_date: Some("2026-03-02".into()),
            analysis_type: None,
            snapshots: Some(feed),
            dry_run: false,
        }
    }

    fn notifications(settings: &Settings) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(settings.notifications_dir())
            .map(|dir| {
                dir.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn write_feed(dir: &Path, items: serde_json::Value) -> PathBuf {
        let path = dir.join("feed.json");
        let feed = serde_json::json!({"as_of_date": "2026-03-02", "items": items});
        std::fs::write(&path, feed.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn empty_feed_still_delivers_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::local(dir.path());
        let feed = write_feed(dir.path(), serde_json::json!([]));

        let done = run(&settings, &EngineConfig::default(), run_args(feed))
            .await
            .unwrap();
        assert_eq!(done, Completion::Done);

        let sent = notifications(&settings);
        assert_eq!(sent.len(), 1, "{sent:?}");
        assert!(!sent[0].starts_with("URGENT_"));
    }

    #[tokio::test]
    async fn all_malformed_feed_is_an_empty_set_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::local(dir.path());
        let feed = write_feed(
            dir.path(),
            serde_json::json!([{"code": "2330"}, {"name": "無代號"}, "not an object"]),
        );

        let done = run(&settings, &EngineConfig::default(), run_args(feed))
            .await
            .unwrap();
        assert_eq!(done, Completion::Done);
        assert_eq!(notifications(&settings).len(), 1);
    }

    #[tokio::test]
    async fn failure_alert_goes_out_urgent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::local(dir.path());
        let err = anyhow::anyhow!("provider unreachable").context("failed to fetch snapshots");

        notify_failure(&settings, "run", &err).await;

        let sent = notifications(&settings);
        assert_eq!(sent.len(), 1, "{sent:?}");
        assert!(sent[0].starts_with("URGENT_"), "{}", sent[0]);
        let body = std::fs::read_to_string(settings.notifications_dir().join(&sent[0])).unwrap();
        assert!(body.contains("failed to fetch snapshots: provider unreachable"));
    }
}
