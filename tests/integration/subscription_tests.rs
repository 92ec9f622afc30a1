use super::*;
use listing_watcher::models::SubscriptionRequest;
use listing_watcher::storage::{SqliteStorage, SubscriptionStore};

const LINK: &str = "https://ads.example.com/road-bike";

fn request(receiver: &str) -> SubscriptionRequest {
    SubscriptionRequest {
        link: LINK.to_string(),
        receiver: receiver.to_string(),
    }
}

fn confirmation_id_from(notification: &Notification) -> Option<String> {
    match notification {
        Notification::ConfirmationRequest { confirm_url, .. } => {
            confirm_url.split("id=").nth(1).map(str::to_string)
        }
        _ => None,
    }
}

#[tokio::test]
async fn test_subscription_lifecycle_feeds_monitoring() -> anyhow::Result<()> {
    let storage = Arc::new(SqliteStorage::in_memory().await?);
    let log = EventLog::default();
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script(LINK, Script::Snapshot(Snapshot::active("Road bike", 1000)));
    let notifier = Arc::new(RecordingNotifier::new(log.clone()));

    let service = SubscriptionService::new(
        storage.clone(),
        fetcher.clone(),
        notifier.clone(),
        "http://localhost:8080",
    );

    // 1. Subscribe: a confirmation link is mailed, nothing is active yet.
    let confirmation_id = service.subscribe(&request("rider@example.com")).await?;
    let mailed = log.notifications();
    assert_eq!(mailed.len(), 1);
    assert_eq!(mailed[0].0, "rider@example.com");
    assert_eq!(confirmation_id_from(&mailed[0].1), Some(confirmation_id.clone()));

    let pending = storage.get_confirmation(&confirmation_id).await?.unwrap();
    assert!(!pending.is_confirmed);
    assert!(storage.subscribers_of(&pending.ad_id).await?.is_empty());

    // 2. Confirm.
    service.confirm(&confirmation_id).await?;
    assert_eq!(storage.subscribers_of(&pending.ad_id).await?, vec!["rider@example.com"]);

    // 3. The listing gets cheaper and a monitoring run picks it up.
    fetcher.script(LINK, Script::Snapshot(Snapshot::active("Road bike", 850)));
    let monitor = Monitor::new(
        storage.clone(),
        fetcher.clone(),
        notifier.clone(),
        test_monitoring_config(),
    );
    let report = monitor.try_run().await?;
    assert_eq!(report.price_changes, 1);

    let ad = storage.get_ad(&pending.ad_id).await?.unwrap();
    assert_eq!(ad.price, 850);
    assert!(ad.last_checked.is_some());
    assert!(log.notifications().iter().any(|(receiver, n)| {
        receiver == "rider@example.com"
            && *n
                == Notification::PriceChanged {
                    ad_name: "Road bike".to_string(),
                    new_price: 850,
                }
    }));

    // 4. Unsubscribe stops further monitoring mail but keeps the record.
    service.unsubscribe(&request("rider@example.com")).await?;
    assert!(storage.subscribers_of(&pending.ad_id).await?.is_empty());
    assert!(storage.get_confirmation(&confirmation_id).await?.is_some());

    // 5. The listing closes; nobody is left to tell.
    let sent_before = log.notifications().len();
    fetcher.script(LINK, Script::Snapshot(Snapshot::removed()));
    let report = monitor.try_run().await?;
    assert_eq!(report.removals, 1);
    assert_eq!(log.notifications().len(), sent_before);
    assert!(storage.get_ad(&pending.ad_id).await?.unwrap().removed);
    Ok(())
}

#[tokio::test]
async fn test_resubscribe_after_removal_creates_new_ad() -> anyhow::Result<()> {
    let storage = Arc::new(SqliteStorage::in_memory().await?);
    let log = EventLog::default();
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script(LINK, Script::Snapshot(Snapshot::active("Road bike", 1000)));
    let notifier = Arc::new(RecordingNotifier::new(log.clone()));
    let service = SubscriptionService::new(
        storage.clone(),
        fetcher.clone(),
        notifier,
        "http://localhost:8080",
    );

    let first = service.subscribe(&request("rider@example.com")).await?;
    let first_ad = storage.get_confirmation(&first).await?.unwrap().ad_id;
    storage.mark_removed(&first_ad).await?;

    let second = service.subscribe(&request("rider@example.com")).await?;
    let second_ad = storage.get_confirmation(&second).await?.unwrap().ad_id;

    assert_ne!(first_ad, second_ad);
    assert!(storage.get_ad(&first_ad).await?.unwrap().removed);
    assert!(!storage.get_ad(&second_ad).await?.unwrap().removed);
    Ok(())
}

#[tokio::test]
async fn test_two_receivers_share_one_ad() -> anyhow::Result<()> {
    let storage = Arc::new(SqliteStorage::in_memory().await?);
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script(LINK, Script::Snapshot(Snapshot::active("Road bike", 1000)));
    let notifier = Arc::new(RecordingNotifier::new(EventLog::default()));
    let service =
        SubscriptionService::new(storage.clone(), fetcher, notifier, "http://localhost:8080");

    let a = service.subscribe(&request("a@example.com")).await?;
    let b = service.subscribe(&request("b@example.com")).await?;
    service.confirm(&a).await?;
    service.confirm(&b).await?;

    let ad_id = storage.get_confirmation(&a).await?.unwrap().ad_id;
    assert_eq!(storage.get_confirmation(&b).await?.unwrap().ad_id, ad_id);
    assert_eq!(storage.subscribers_of(&ad_id).await?, vec!["a@example.com", "b@example.com"]);
    assert_eq!(storage.list_active_ads(10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_listing_is_not_subscribed() -> anyhow::Result<()> {
    let storage = Arc::new(SqliteStorage::in_memory().await?);
    let log = EventLog::default();
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script(LINK, Script::Fail);
    let service = SubscriptionService::new(
        storage.clone(),
        fetcher,
        Arc::new(RecordingNotifier::new(log.clone())),
        "http://localhost:8080",
    );

    let result = service.subscribe(&request("a@example.com")).await;
    assert!(matches!(result, Err(AppError::Scraping(_))));
    assert!(storage.list_active_ads(10).await?.is_empty());
    assert!(log.notifications().is_empty());
    Ok(())
}
