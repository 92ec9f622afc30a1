use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::monitor::{Monitor, RunReport};
use crate::MonitorError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub completed_runs: u64,
    pub skipped_ticks: u64,
    pub failed_runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_report: Option<RunReport>,
}

/// Triggers [`Monitor::try_run`] on a fixed interval.
pub struct MonitorScheduler {
    scheduler: JobScheduler,
    monitor: Arc<Monitor>,
    stats: Arc<RwLock<SchedulerStats>>,
    job_id: Option<Uuid>,
}

impl MonitorScheduler {
    pub async fn new(monitor: Arc<Monitor>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            monitor,
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            job_id: None,
        })
    }

    /// Registers the repeated monitoring job and starts ticking.
    pub async fn start(&mut self) -> Result<()> {
        let interval = self.monitor.config().interval();
        let monitor = Arc::clone(&self.monitor);
        let stats = Arc::clone(&self.stats);

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let monitor = Arc::clone(&monitor);
            let stats = Arc::clone(&stats);

            Box::pin(async move {
                stats.write().await.ticks += 1;
                // Outcome is already logged by the monitor and recorded in stats.
                let _ = Self::execute(&monitor, &stats).await;
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;

        tracing::info!("Monitor scheduler started, interval {}s", interval.as_secs());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }
        self.scheduler.shutdown().await?;
        tracing::info!("Monitor scheduler shutdown");
        Ok(())
    }

    /// Runs a pass immediately, outside of the schedule. Subject to the same
    /// single-flight guard as scheduled ticks.
    pub async fn run_now(&self) -> std::result::Result<RunReport, MonitorError> {
        tracing::info!("Running immediate monitoring pass");
        Self::execute(&self.monitor, &self.stats).await
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    async fn execute(
        monitor: &Monitor,
        stats: &RwLock<SchedulerStats>,
    ) -> std::result::Result<RunReport, MonitorError> {
        let result = monitor.try_run().await;

        let mut stats = stats.write().await;
        match &result {
            Ok(report) => {
                stats.completed_runs += 1;
                stats.last_run = Some(Utc::now());
                stats.last_report = Some(report.clone());
            }
            Err(MonitorError::AlreadyRunning) => stats.skipped_ticks += 1,
            Err(_) => {
                stats.failed_runs += 1;
                stats.last_run = Some(Utc::now());
            }
        }

        result
    }
}
