// Integration tests for Listing Watcher
// Shared fakes and helpers for the monitoring engine, subscriptions and API

pub mod subscription_tests;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

use listing_watcher::{
    config::MonitoringConfig,
    models::{Ad, Snapshot},
    notifications::{Notification, Notifier},
    scraper::AdFetcher,
    storage::{AdStore, InMemoryStorage},
    web::{create_router, AppState},
    AppError, Monitor, SubscriptionService,
};

/// Side effects observed by the fakes, in the order they completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MarkRemoved(String),
    UpdatePrice(String, i64),
    Notified(String, Notification),
    BatchMarkChecked(Vec<String>),
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(String, Notification)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Notified(receiver, notification) => Some((receiver, notification)),
                _ => None,
            })
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::BatchMarkChecked(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

#[derive(Clone)]
pub enum Script {
    Snapshot(Snapshot),
    Fail,
    /// Waits for the gate to be opened, then returns the snapshot.
    Gated(Arc<Notify>, Snapshot),
}

/// Answers fetches from a per-link script and tracks concurrency.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(&self, link: &str, script: Script) {
        self.scripts.lock().unwrap().insert(link.to_string(), script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdFetcher for ScriptedFetcher {
    async fn fetch(&self, link: &str) -> listing_watcher::Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.scripts.lock().unwrap().get(link).cloned();
        let result = match script {
            Some(Script::Snapshot(snapshot)) => Ok(snapshot),
            Some(Script::Gated(gate, snapshot)) => {
                gate.notified().await;
                Ok(snapshot)
            }
            Some(Script::Fail) => Err(AppError::Scraping(format!("connection refused: {}", link))),
            None => Err(AppError::Scraping(format!("no script for {}", link))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// [`InMemoryStorage`] that records mutations and can be told to fail.
#[derive(Clone)]
pub struct RecordingStore {
    pub inner: InMemoryStorage,
    log: EventLog,
    write_delay: Option<Duration>,
    failing_ads: Arc<Mutex<HashSet<String>>>,
    fail_batch: bool,
}

impl RecordingStore {
    pub fn new(inner: InMemoryStorage, log: EventLog) -> Self {
        Self {
            inner,
            log,
            write_delay: None,
            failing_ads: Arc::new(Mutex::new(HashSet::new())),
            fail_batch: false,
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn with_failing_batch(mut self) -> Self {
        self.fail_batch = true;
        self
    }

    pub fn fail_writes_for(&self, ad_id: &str) {
        self.failing_ads.lock().unwrap().insert(ad_id.to_string());
    }

    async fn before_write(&self, ad_id: &str) -> listing_watcher::Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_ads.lock().unwrap().contains(ad_id) {
            return Err(AppError::Internal(format!("write rejected for {}", ad_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AdStore for RecordingStore {
    async fn list_active_ads(&self, limit: u32) -> listing_watcher::Result<Vec<Ad>> {
        self.inner.list_active_ads(limit).await
    }

    async fn mark_removed(&self, ad_id: &str) -> listing_watcher::Result<()> {
        self.before_write(ad_id).await?;
        self.inner.mark_removed(ad_id).await?;
        self.log.push(Event::MarkRemoved(ad_id.to_string()));
        Ok(())
    }

    async fn update_price(&self, ad_id: &str, new_price: i64) -> listing_watcher::Result<()> {
        self.before_write(ad_id).await?;
        self.inner.update_price(ad_id, new_price).await?;
        self.log.push(Event::UpdatePrice(ad_id.to_string(), new_price));
        Ok(())
    }

    async fn subscribers_of(&self, ad_id: &str) -> listing_watcher::Result<Vec<String>> {
        self.inner.subscribers_of(ad_id).await
    }

    async fn batch_mark_checked(&self, ad_ids: &BTreeSet<String>) -> listing_watcher::Result<()> {
        if self.fail_batch {
            return Err(AppError::Internal("database is locked".to_string()));
        }
        self.inner.batch_mark_checked(ad_ids).await?;
        self.log.push(Event::BatchMarkChecked(ad_ids.iter().cloned().collect()));
        Ok(())
    }
}

/// Records every delivered notification, optionally slowly or failing for
/// some receivers.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    log: EventLog,
    delay: Option<Duration>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingNotifier {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_for(&self, receiver: &str) {
        self.failing.lock().unwrap().insert(receiver.to_string());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        receiver: &str,
        notification: Notification,
    ) -> listing_watcher::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(receiver) {
            return Err(AppError::Email(format!("mailbox unavailable: {}", receiver)));
        }
        self.log.push(Event::Notified(receiver.to_string(), notification));
        Ok(())
    }
}

pub fn test_monitoring_config() -> MonitoringConfig {
    MonitoringConfig {
        interval_seconds: 1,
        batch_limit: 1000,
        max_concurrent_checks: 8,
        fetch_timeout_seconds: 2,
    }
}

/// Inserts an active ad with the given confirmed subscribers.
pub async fn seed_ad(
    storage: &InMemoryStorage,
    name: &str,
    price: i64,
    subscribers: &[&str],
) -> Ad {
    let ad = Ad::new(format!("https://ads.example.com/{}", name), name, price);
    storage.insert_ad(ad.clone()).await;
    for email in subscribers {
        storage.add_subscriber(&ad.id, email, true).await;
    }
    ad
}

pub fn build_monitor(
    store: RecordingStore,
    fetcher: Arc<ScriptedFetcher>,
    notifier: RecordingNotifier,
    config: MonitoringConfig,
) -> Monitor {
    Monitor::new(Arc::new(store), fetcher, Arc::new(notifier), config)
}

/// Router over in-memory storage and recording fakes.
pub fn create_test_app(
    storage: InMemoryStorage,
    fetcher: Arc<ScriptedFetcher>,
    log: EventLog,
) -> axum::Router {
    create_test_app_with_timeout(storage, fetcher, log, Duration::from_secs(10))
}

pub fn create_test_app_with_timeout(
    storage: InMemoryStorage,
    fetcher: Arc<ScriptedFetcher>,
    log: EventLog,
    request_timeout: Duration,
) -> axum::Router {
    let notifier = Arc::new(RecordingNotifier::new(log.clone()));
    let subscriptions = Arc::new(SubscriptionService::new(
        Arc::new(storage.clone()),
        fetcher.clone(),
        notifier.clone(),
        "http://localhost:8080",
    ));
    let monitor = Arc::new(Monitor::new(
        Arc::new(RecordingStore::new(storage, log)),
        fetcher,
        notifier,
        test_monitoring_config(),
    ));

    create_router(AppState { subscriptions, monitor }, request_timeout)
}

/// Helper to make HTTP requests to the test app
pub async fn make_request(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> anyhow::Result<axum::response::Response> {
    let mut request = Request::builder().method(method).uri(uri);

    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = request.body(match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    })?;

    Ok(app.clone().oneshot(request).await?)
}

pub async fn read_json(response: axum::response::Response) -> anyhow::Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_seconds: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}
