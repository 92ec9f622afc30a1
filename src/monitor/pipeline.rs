//! Serial consumers of the two result queues.
//!
//! Each pipeline handles one item at a time in arrival order. Notification
//! sends are spawned into a per-pipeline [`JoinSet`] so they overlap with
//! later items, and the pipeline only returns once its queue is closed and
//! every send it started has finished.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::check::PriceChange;
use crate::models::Ad;
use crate::notifications::{Notifier, NotifierExt};
use crate::storage::AdStore;
use crate::{AppError, MonitorError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub processed: usize,
    pub persisted: usize,
    pub persistence_failures: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

/// In-flight notification sends of one pipeline.
#[derive(Default)]
struct Deliveries {
    tasks: JoinSet<(String, crate::Result<()>)>,
}

impl Deliveries {
    fn spawn<F>(&mut self, receiver: String, send: F)
    where
        F: Future<Output = crate::Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (receiver, send.await) });
    }

    async fn finish(mut self, report: &mut PipelineReport) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.notifications_sent += 1,
                Ok((receiver, Err(source))) => {
                    report.notifications_failed += 1;
                    metrics::counter!("watcher_notifications_failed_total").increment(1);
                    let err = MonitorError::NotificationFailed { receiver, source };
                    tracing::warn!("{}", err);
                }
                Err(e) => {
                    report.notifications_failed += 1;
                    metrics::counter!("watcher_notifications_failed_total").increment(1);
                    tracing::error!("Notification task failed: {}", e);
                }
            }
        }
    }
}

fn persistence_failed(report: &mut PipelineReport, ad_id: &str, source: AppError, action: &str) {
    report.persistence_failures += 1;
    let err = MonitorError::PersistenceFailed {
        ad_id: ad_id.to_string(),
        source,
    };
    tracing::error!(ad_id = %ad_id, action, "{}", err);
}

/// Marks closed listings removed and tells their subscribers.
pub struct RemovalPipeline {
    store: Arc<dyn AdStore>,
    notifier: Arc<dyn Notifier>,
}

impl RemovalPipeline {
    pub fn new(store: Arc<dyn AdStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn run(self, mut queue: mpsc::Receiver<Ad>) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut deliveries = Deliveries::default();

        while let Some(ad) = queue.recv().await {
            report.processed += 1;

            if let Err(e) = self.store.mark_removed(&ad.id).await {
                persistence_failed(&mut report, &ad.id, e, "mark_removed");
                continue;
            }
            report.persisted += 1;

            let receivers = match self.store.subscribers_of(&ad.id).await {
                Ok(receivers) => receivers,
                Err(e) => {
                    persistence_failed(&mut report, &ad.id, e, "subscribers_of");
                    continue;
                }
            };

            tracing::info!(ad_id = %ad.id, receivers = receivers.len(), "Ad removed");
            for receiver in receivers {
                let notifier = Arc::clone(&self.notifier);
                let (name, link) = (ad.name.clone(), ad.link.clone());
                let to = receiver.clone();
                deliveries.spawn(receiver, async move {
                    notifier.send_closed(&to, &name, &link).await
                });
            }
        }

        deliveries.finish(&mut report).await;
        report
    }
}

/// Persists new prices and tells subscribers about them.
pub struct UpdatePipeline {
    store: Arc<dyn AdStore>,
    notifier: Arc<dyn Notifier>,
}

impl UpdatePipeline {
    pub fn new(store: Arc<dyn AdStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn run(self, mut queue: mpsc::Receiver<PriceChange>) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut deliveries = Deliveries::default();

        while let Some(PriceChange { ad, new_price }) = queue.recv().await {
            report.processed += 1;

            let receivers = match self.store.subscribers_of(&ad.id).await {
                Ok(receivers) => receivers,
                Err(e) => {
                    persistence_failed(&mut report, &ad.id, e, "subscribers_of");
                    continue;
                }
            };

            if let Err(e) = self.store.update_price(&ad.id, new_price).await {
                persistence_failed(&mut report, &ad.id, e, "update_price");
                continue;
            }
            report.persisted += 1;

            tracing::info!(
                ad_id = %ad.id,
                old_price = ad.price,
                new_price,
                receivers = receivers.len(),
                "Price updated"
            );
            for receiver in receivers {
                let notifier = Arc::clone(&self.notifier);
                let name = ad.name.clone();
                let to = receiver.clone();
                deliveries.spawn(receiver, async move {
                    notifier.send_price_changed(&to, &name, new_price).await
                });
            }
        }

        deliveries.finish(&mut report).await;
        report
    }
}
