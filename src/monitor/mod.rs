//! The periodic monitoring engine.
//!
//! A run lists the least recently checked ads, re-checks them on a bounded
//! pool of tasks, fans removals and price changes into two serial pipelines
//! and, once every task and both pipelines have finished, records the
//! successfully fetched ads as checked in one batched call.

pub mod check;
pub mod classifier;
pub mod pipeline;
pub mod run_guard;

pub use check::{CheckOutcome, OutcomeRoutes, PriceChange};
pub use classifier::{classify, Change};
pub use pipeline::{PipelineReport, RemovalPipeline, UpdatePipeline};
pub use run_guard::{RunGuard, RunPermit};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::MonitoringConfig;
use crate::notifications::Notifier;
use crate::scraper::AdFetcher;
use crate::storage::AdStore;
use crate::MonitorError;

/// Summary of one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub listed: usize,
    pub checked: usize,
    pub fetch_failures: usize,
    pub unchanged: usize,
    pub price_changes: usize,
    pub removals: usize,
    pub persistence_failures: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    /// Ids passed to the batched last-checked update, in order.
    pub checked_ids: Vec<String>,
    pub batch_updated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
struct CheckTally {
    checked: BTreeSet<String>,
    fetch_failures: usize,
    unchanged: usize,
}

impl CheckTally {
    fn record(&mut self, outcome: CheckOutcome) {
        if !outcome.was_fetched() {
            self.fetch_failures += 1;
            return;
        }
        if matches!(outcome, CheckOutcome::Unchanged { .. }) {
            self.unchanged += 1;
        }
        self.checked.insert(outcome.ad_id().to_string());
    }
}

pub struct Monitor {
    store: Arc<dyn AdStore>,
    fetcher: Arc<dyn AdFetcher>,
    notifier: Arc<dyn Notifier>,
    config: MonitoringConfig,
    guard: RunGuard,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn AdStore>,
        fetcher: Arc<dyn AdFetcher>,
        notifier: Arc<dyn Notifier>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            config,
            guard: RunGuard::new(),
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Runs one monitoring pass unless another one is still in progress.
    ///
    /// Per-ad and per-recipient failures never fail the run; they are logged
    /// and counted in the returned report. Only [`MonitorError::AlreadyRunning`]
    /// and [`MonitorError::ListAdsFailed`] are returned as errors.
    pub async fn try_run(&self) -> Result<RunReport, MonitorError> {
        let Some(_permit) = self.guard.try_acquire() else {
            metrics::counter!("watcher_runs_skipped_total").increment(1);
            tracing::debug!("{}, skipping tick", MonitorError::AlreadyRunning);
            return Err(MonitorError::AlreadyRunning);
        };

        let started = Instant::now();

        let ads = match self.store.list_active_ads(self.config.batch_limit).await {
            Ok(ads) => ads,
            Err(e) => {
                let err = MonitorError::ListAdsFailed(e);
                tracing::error!("{}", err);
                return Err(err);
            }
        };
        let listed = ads.len();
        tracing::info!(ads = listed, "Monitoring run started");

        // Sized so a check task never waits on a slow pipeline.
        let capacity = listed.max(1);
        let (removed_tx, removed_rx) = mpsc::channel(capacity);
        let (updated_tx, updated_rx) = mpsc::channel(capacity);

        // Owned by the run so a cancelled run aborts its pipelines before the
        // permit is released.
        let mut pipelines = JoinSet::new();
        let removals = RemovalPipeline::new(Arc::clone(&self.store), Arc::clone(&self.notifier));
        pipelines.spawn(async move { (PipelineKind::Removal, removals.run(removed_rx).await) });
        let updates = UpdatePipeline::new(Arc::clone(&self.store), Arc::clone(&self.notifier));
        pipelines.spawn(async move { (PipelineKind::Update, updates.run(updated_rx).await) });

        let routes = OutcomeRoutes::new(removed_tx, updated_tx);
        let workers = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let fetch_timeout = self.config.fetch_timeout();

        let mut checks = JoinSet::new();
        for ad in ads {
            let fetcher = Arc::clone(&self.fetcher);
            let workers = Arc::clone(&workers);
            let routes = routes.clone();
            checks.spawn(async move {
                let _slot = workers.acquire().await;
                check::check(ad, fetcher.as_ref(), fetch_timeout, &routes).await
            });
        }
        // The queues close once the last check task drops its routes.
        drop(routes);

        let mut tally = CheckTally::default();
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok(outcome) => tally.record(outcome),
                Err(e) => {
                    tally.fetch_failures += 1;
                    tracing::error!("Check task failed: {}", e);
                }
            }
        }

        let (removal_report, update_report) = join_pipelines(pipelines).await;

        let batch_updated = match self.store.batch_mark_checked(&tally.checked).await {
            Ok(()) => true,
            Err(e) => {
                let err = MonitorError::BatchUpdateFailed(e);
                tracing::error!(ads = tally.checked.len(), "{}", err);
                false
            }
        };

        let elapsed = started.elapsed();
        let report = RunReport {
            listed,
            checked: tally.checked.len(),
            fetch_failures: tally.fetch_failures,
            unchanged: tally.unchanged,
            price_changes: update_report.persisted,
            removals: removal_report.persisted,
            persistence_failures: removal_report.persistence_failures
                + update_report.persistence_failures,
            notifications_sent: removal_report.notifications_sent
                + update_report.notifications_sent,
            notifications_failed: removal_report.notifications_failed
                + update_report.notifications_failed,
            checked_ids: tally.checked.into_iter().collect(),
            batch_updated,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };

        metrics::counter!("watcher_runs_total").increment(1);
        metrics::histogram!("watcher_run_duration_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            listed = report.listed,
            checked = report.checked,
            fetch_failures = report.fetch_failures,
            price_changes = report.price_changes,
            removals = report.removals,
            notifications_sent = report.notifications_sent,
            duration_ms = report.duration_ms,
            "Monitoring run completed"
        );

        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineKind {
    Removal,
    Update,
}

/// Waits for both pipelines. Returns the removal report, then the update report.
async fn join_pipelines(
    mut pipelines: JoinSet<(PipelineKind, PipelineReport)>,
) -> (PipelineReport, PipelineReport) {
    let mut removal = PipelineReport::default();
    let mut update = PipelineReport::default();

    while let Some(joined) = pipelines.join_next().await {
        match joined {
            Ok((PipelineKind::Removal, report)) => removal = report,
            Ok((PipelineKind::Update, report)) => update = report,
            Err(e) => tracing::error!("Pipeline task failed: {}", e),
        }
    }

    (removal, update)
}
