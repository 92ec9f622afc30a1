use std::sync::Arc;
use validator::Validate;

use crate::models::SubscriptionRequest;
use crate::notifications::{Notification, Notifier};
use crate::scraper::AdFetcher;
use crate::storage::SubscriptionStore;
use crate::{AppError, Result};

/// Subscribe, confirm and unsubscribe flows behind the HTTP API.
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    fetcher: Arc<dyn AdFetcher>,
    notifier: Arc<dyn Notifier>,
    base_url: String,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        fetcher: Arc<dyn AdFetcher>,
        notifier: Arc<dyn Notifier>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn confirm_url(&self, confirmation_id: &str) -> String {
        format!("{}/confirm?id={}", self.base_url, confirmation_id)
    }

    /// Creates a pending subscription and mails the confirmation link.
    /// Returns the confirmation id.
    pub async fn subscribe(&self, request: &SubscriptionRequest) -> Result<String> {
        request.validate()?;

        let snapshot = self.fetcher.fetch(&request.link).await?;
        if snapshot.removed {
            return Err(AppError::ListingClosed {
                link: request.link.clone(),
            });
        }

        if self.store.is_subscribed(&request.link, &request.receiver).await? {
            return Err(AppError::already_exists(format!(
                "subscription of {} to {}",
                request.receiver, request.link
            )));
        }

        let confirmation_id = self
            .store
            .create_subscription(&request.link, &snapshot, &request.receiver)
            .await?;

        self.notifier
            .send(
                &request.receiver,
                Notification::ConfirmationRequest {
                    ad_name: snapshot.name,
                    confirm_url: self.confirm_url(&confirmation_id),
                },
            )
            .await?;

        tracing::info!(
            confirmation_id = %confirmation_id,
            link = %request.link,
            "Subscription requested"
        );
        Ok(confirmation_id)
    }

    pub async fn confirm(&self, confirmation_id: &str) -> Result<()> {
        let pending = self
            .store
            .get_confirmation(confirmation_id)
            .await?
            .filter(|c| !c.is_confirmed)
            .ok_or_else(|| AppError::not_found(format!("confirmation {}", confirmation_id)))?;

        self.store.confirm(&pending.id).await?;

        let details = self
            .store
            .subscription_details(&pending.id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("ad {}", pending.ad_id)))?;

        self.notifier
            .send(&details.email, Notification::SubscriptionConfirmed { ad_name: details.name })
            .await?;

        tracing::info!(confirmation_id = %pending.id, "Subscription confirmed");
        Ok(())
    }

    /// Un-confirms the subscription. The record is kept.
    pub async fn unsubscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        request.validate()?;

        let confirmation_id = self
            .store
            .find_confirmed(&request.receiver, &request.link)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "subscription of {} to {}",
                    request.receiver, request.link
                ))
            })?;

        self.store.unconfirm(&confirmation_id).await?;

        self.notifier
            .send(
                &request.receiver,
                Notification::Unsubscribed {
                    link: request.link.clone(),
                },
            )
            .await?;

        tracing::info!(confirmation_id = %confirmation_id, "Unsubscribed");
        Ok(())
    }
}
