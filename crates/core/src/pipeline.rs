//! One time slot end to end: score, classify, persist, render, deliver.

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::delivery::{DeliveryOrchestrator, DeliveryOutcome};
use crate::domain::recommendation::RecommendationSet;
use crate::domain::snapshot::StockSnapshot;
use crate::report;
use crate::scoring::{AnalysisType, CompositeScorer};
use crate::storage;
use crate::time::TimeSlot;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};

/// Scoring and classification with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    scorer: CompositeScorer,
    classifier: Classifier,
}

impl Engine {
    pub fn new(scorer: CompositeScorer, classifier: Classifier) -> Self {
        Self { scorer, classifier }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            CompositeScorer::new(config.scoring.clone()),
            Classifier::new(config.classifier.clone()),
        )
    }

    /// Pure and deterministic. Returns the set and the number of snapshots skipped as malformed.
    pub fn analyze(
        &self,
        snapshots: &[StockSnapshot],
        time_slot: TimeSlot,
        analysis_type: AnalysisType,
    ) -> (RecommendationSet, usize) {
        let batch = self.scorer.score_batch(snapshots, analysis_type);
        let set = self.classifier.classify(&batch.scores, time_slot);
        (set, batch.skipped)
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub as_of_date: NaiveDate,
    pub time_slot: TimeSlot,
    /// Defaults to the slot's focus.
    pub analysis_type: Option<AnalysisType>,
    pub snapshots: &'a [StockSnapshot],
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub set: RecommendationSet,
    pub outcome: DeliveryOutcome,
    /// Snapshots dropped as malformed during scoring.
    pub skipped: usize,
    pub results_path: Option<PathBuf>,
}

impl RunReport {
    pub fn delivered(&self) -> bool {
        self.outcome.overall_success
    }
}

pub async fn run_slot(
    engine: &Engine,
    orchestrator: &mut DeliveryOrchestrator,
    data_dir: &Path,
    request: RunRequest<'_>,
    now: DateTime<Utc>,
) -> RunReport {
    let analysis_type = request
        .analysis_type
        .unwrap_or_else(|| request.time_slot.default_analysis_type());

    tracing::info!(
        as_of_date = %request.as_of_date,
        time_slot = %request.time_slot,
        %analysis_type,
        snapshots = request.snapshots.len(),
        "running time slot"
    );

    let (set, skipped) = engine.analyze(request.snapshots, request.time_slot, analysis_type);

    // Advisory output; a write failure must not block delivery.
    let results_path = match storage::recommendations::persist(data_dir, request.as_of_date, &set, now).await {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "failed to persist recommendations");
            None
        }
    };

    let notification = report::render(&set, request.as_of_date);
    let outcome = orchestrator.deliver_at(&notification, now).await;

    tracing::info!(
        time_slot = %request.time_slot,
        recommendations = set.len(),
        skipped,
        delivered = outcome.overall_success,
        "time slot finished"
    );

    RunReport {
        set,
        outcome,
        skipped,
        results_path,
    }
}
