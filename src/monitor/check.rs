use std::time::Duration;
use tokio::sync::mpsc;

use super::classifier::{classify, Change};
use crate::models::Ad;
use crate::scraper::AdFetcher;
use crate::MonitorError;

/// A price change handed to the update pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceChange {
    pub ad: Ad,
    pub new_price: i64,
}

/// Input ends of the two result queues. Each check task holds a clone; the
/// queues close once every clone is dropped.
#[derive(Debug, Clone)]
pub struct OutcomeRoutes {
    removed: mpsc::Sender<Ad>,
    updated: mpsc::Sender<PriceChange>,
}

impl OutcomeRoutes {
    pub fn new(removed: mpsc::Sender<Ad>, updated: mpsc::Sender<PriceChange>) -> Self {
        Self { removed, updated }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Unchanged { ad_id: String },
    PriceChanged { ad_id: String, new_price: i64 },
    Removed { ad_id: String },
    FetchFailed { ad_id: String, cause: String },
}

impl CheckOutcome {
    pub fn ad_id(&self) -> &str {
        match self {
            CheckOutcome::Unchanged { ad_id }
            | CheckOutcome::PriceChanged { ad_id, .. }
            | CheckOutcome::Removed { ad_id }
            | CheckOutcome::FetchFailed { ad_id, .. } => ad_id,
        }
    }

    /// Whether the listing was fetched, i.e. whether it counts as checked.
    pub fn was_fetched(&self) -> bool {
        !matches!(self, CheckOutcome::FetchFailed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Unchanged { .. } => "unchanged",
            CheckOutcome::PriceChanged { .. } => "price_changed",
            CheckOutcome::Removed { .. } => "removed",
            CheckOutcome::FetchFailed { .. } => "fetch_failed",
        }
    }
}

/// Re-checks one ad and routes a removal or price change to its pipeline.
pub async fn check(
    ad: Ad,
    fetcher: &dyn AdFetcher,
    fetch_timeout: Duration,
    routes: &OutcomeRoutes,
) -> CheckOutcome {
    let fetched = match tokio::time::timeout(fetch_timeout, fetcher.fetch(&ad.link)).await {
        Ok(result) => result,
        Err(_) => Err(crate::AppError::Scraping(format!(
            "fetch timed out after {}s",
            fetch_timeout.as_secs_f64()
        ))),
    };

    let snapshot = match fetched {
        Ok(snapshot) => snapshot,
        Err(source) => {
            let err = MonitorError::FetchFailed {
                ad_id: ad.id.clone(),
                source,
            };
            tracing::warn!(ad_id = %ad.id, link = %ad.link, "{}", err);
            return CheckOutcome::FetchFailed {
                ad_id: ad.id,
                cause: err.to_string(),
            };
        }
    };

    let outcome = match classify(&ad, &snapshot) {
        Change::Unchanged => CheckOutcome::Unchanged { ad_id: ad.id },
        Change::Removed => {
            let ad_id = ad.id.clone();
            tracing::debug!(ad_id = %ad_id, "Listing closed");
            if routes.removed.send(ad).await.is_err() {
                tracing::error!(ad_id = %ad_id, "Removal pipeline is gone, dropping removal");
            }
            CheckOutcome::Removed { ad_id }
        }
        Change::PriceChanged(new_price) => {
            let ad_id = ad.id.clone();
            tracing::debug!(ad_id = %ad_id, old_price = ad.price, new_price, "Price changed");
            if routes.updated.send(PriceChange { ad, new_price }).await.is_err() {
                tracing::error!(ad_id = %ad_id, "Update pipeline is gone, dropping price change");
            }
            CheckOutcome::PriceChanged { ad_id, new_price }
        }
    };

    metrics::counter!("watcher_checks_total", "outcome" => outcome.label()).increment(1);
    outcome
}
