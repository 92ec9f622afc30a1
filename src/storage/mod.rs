//! Persistence seams for ads and subscriptions.
//!
//! The monitor only needs [`AdStore`]. The subscription surface needs
//! [`SubscriptionStore`]. Both are implemented by [`SqliteStorage`] and by
//! [`InMemoryStorage`].

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::models::{Ad, Confirmation, Snapshot, SubscriptionDetails};
use crate::Result;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

/// Storage operations used by a monitoring run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdStore: Send + Sync {
    /// Non-removed ads, least recently checked first. Never-checked ads lead.
    async fn list_active_ads(&self, limit: u32) -> Result<Vec<Ad>>;

    /// Marking an already removed ad again is not an error.
    async fn mark_removed(&self, ad_id: &str) -> Result<()>;

    async fn update_price(&self, ad_id: &str, new_price: i64) -> Result<()>;

    /// Confirmed recipients of the ad, without duplicates.
    async fn subscribers_of(&self, ad_id: &str) -> Result<Vec<String>>;

    /// Sets `last_checked` to now for every id in one call.
    async fn batch_mark_checked(&self, ad_ids: &BTreeSet<String>) -> Result<()>;
}

/// Storage operations behind subscribe, confirm and unsubscribe.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// True when `email` holds a confirmed subscription on the active ad at `link`.
    async fn is_subscribed(&self, link: &str, email: &str) -> Result<bool>;

    /// Creates the active ad for `link` (or reuses it) and an unconfirmed
    /// confirmation for `email`, atomically. A pending confirmation for the
    /// same pair is reused. Returns the confirmation id.
    async fn create_subscription(
        &self,
        link: &str,
        snapshot: &Snapshot,
        email: &str,
    ) -> Result<String>;

    async fn get_confirmation(&self, id: &str) -> Result<Option<Confirmation>>;

    async fn confirm(&self, id: &str) -> Result<()>;

    async fn subscription_details(&self, id: &str) -> Result<Option<SubscriptionDetails>>;

    /// Id of the confirmed subscription of `email` on the active ad at `link`.
    async fn find_confirmed(&self, email: &str, link: &str) -> Result<Option<String>>;

    /// Clears the confirmed flag. The record itself is kept.
    async fn unconfirm(&self, id: &str) -> Result<()>;
}
