use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AdStore, SubscriptionStore};
use crate::models::{generate_id, Ad, Confirmation, Snapshot, SubscriptionDetails};
use crate::Result;

/// Process-local storage with the same semantics as [`super::SqliteStorage`].
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    ads: Arc<RwLock<HashMap<String, Ad>>>,
    confirmations: Arc<RwLock<HashMap<String, Confirmation>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_ad(&self, ad: Ad) {
        self.ads.write().await.insert(ad.id.clone(), ad);
    }

    /// Adds a subscription record directly, bypassing the confirmation flow.
    pub async fn add_subscriber(&self, ad_id: &str, email: &str, confirmed: bool) -> String {
        let confirmation = Confirmation {
            id: generate_id(),
            email: email.to_string(),
            ad_id: ad_id.to_string(),
            is_confirmed: confirmed,
            created_at: Utc::now(),
        };
        let id = confirmation.id.clone();
        self.confirmations.write().await.insert(id.clone(), confirmation);
        id
    }

    pub async fn get_ad(&self, ad_id: &str) -> Option<Ad> {
        self.ads.read().await.get(ad_id).cloned()
    }

    async fn active_ad_by_link(&self, link: &str) -> Option<Ad> {
        self.ads
            .read()
            .await
            .values()
            .find(|ad| ad.link == link && !ad.removed)
            .cloned()
    }
}

#[async_trait]
impl AdStore for InMemoryStorage {
    async fn list_active_ads(&self, limit: u32) -> Result<Vec<Ad>> {
        let ads = self.ads.read().await;
        let mut active: Vec<Ad> = ads.values().filter(|ad| !ad.removed).cloned().collect();
        // None sorts before Some, matching NULLS FIRST
        active.sort_by(|a, b| a.last_checked.cmp(&b.last_checked));
        active.truncate(limit as usize);
        Ok(active)
    }

    async fn mark_removed(&self, ad_id: &str) -> Result<()> {
        if let Some(ad) = self.ads.write().await.get_mut(ad_id) {
            ad.removed = true;
        }
        Ok(())
    }

    async fn update_price(&self, ad_id: &str, new_price: i64) -> Result<()> {
        if let Some(ad) = self.ads.write().await.get_mut(ad_id) {
            ad.price = new_price;
        }
        Ok(())
    }

    async fn subscribers_of(&self, ad_id: &str) -> Result<Vec<String>> {
        let confirmations = self.confirmations.read().await;
        let emails: BTreeSet<String> = confirmations
            .values()
            .filter(|c| c.ad_id == ad_id && c.is_confirmed)
            .map(|c| c.email.clone())
            .collect();
        Ok(emails.into_iter().collect())
    }

    async fn batch_mark_checked(&self, ad_ids: &BTreeSet<String>) -> Result<()> {
        let now = Utc::now();
        let mut ads = self.ads.write().await;
        for id in ad_ids {
            if let Some(ad) = ads.get_mut(id) {
                ad.last_checked = Some(now);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStorage {
    async fn is_subscribed(&self, link: &str, email: &str) -> Result<bool> {
        Ok(self.find_confirmed(email, link).await?.is_some())
    }

    async fn create_subscription(
        &self,
        link: &str,
        snapshot: &Snapshot,
        email: &str,
    ) -> Result<String> {
        // Both maps are held for the whole operation so it is atomic.
        let mut ads = self.ads.write().await;
        let mut confirmations = self.confirmations.write().await;

        let ad_id = match ads.values().find(|ad| ad.link == link && !ad.removed) {
            Some(ad) => ad.id.clone(),
            None => {
                let ad = Ad::new(link, snapshot.name.clone(), snapshot.price);
                let id = ad.id.clone();
                ads.insert(id.clone(), ad);
                id
            }
        };

        if let Some(pending) = confirmations
            .values()
            .find(|c| c.ad_id == ad_id && c.email == email && !c.is_confirmed)
        {
            return Ok(pending.id.clone());
        }

        let confirmation = Confirmation {
            id: generate_id(),
            email: email.to_string(),
            ad_id,
            is_confirmed: false,
            created_at: Utc::now(),
        };
        let id = confirmation.id.clone();
        confirmations.insert(id.clone(), confirmation);
        Ok(id)
    }

    async fn get_confirmation(&self, id: &str) -> Result<Option<Confirmation>> {
        Ok(self.confirmations.read().await.get(id).cloned())
    }

    async fn confirm(&self, id: &str) -> Result<()> {
        if let Some(c) = self.confirmations.write().await.get_mut(id) {
            c.is_confirmed = true;
        }
        Ok(())
    }

    async fn subscription_details(&self, id: &str) -> Result<Option<SubscriptionDetails>> {
        let Some(confirmation) = self.get_confirmation(id).await? else {
            return Ok(None);
        };
        Ok(self.get_ad(&confirmation.ad_id).await.map(|ad| SubscriptionDetails {
            email: confirmation.email,
            name: ad.name,
        }))
    }

    async fn find_confirmed(&self, email: &str, link: &str) -> Result<Option<String>> {
        let Some(ad) = self.active_ad_by_link(link).await else {
            return Ok(None);
        };
        Ok(self
            .confirmations
            .read()
            .await
            .values()
            .find(|c| c.ad_id == ad.id && c.email == email && c.is_confirmed)
            .map(|c| c.id.clone()))
    }

    async fn unconfirm(&self, id: &str) -> Result<()> {
        if let Some(c) = self.confirmations.write().await.get_mut(id) {
            c.is_confirmed = false;
        }
        Ok(())
    }
}
