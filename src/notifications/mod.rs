use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub mod email;

pub use email::EmailNotifier;

/// Messages sent to a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ConfirmationRequest { ad_name: String, confirm_url: String },
    SubscriptionConfirmed { ad_name: String },
    PriceChanged { ad_name: String, new_price: i64 },
    AdClosed { ad_name: String, link: String },
    Unsubscribed { link: String },
}

impl Notification {
    pub fn subject(&self) -> String {
        match self {
            Notification::ConfirmationRequest { ad_name, .. }
            | Notification::SubscriptionConfirmed { ad_name } => {
                format!("Subscription to \"{}\"", ad_name)
            }
            Notification::PriceChanged { ad_name, .. } => format!("Price changed: \"{}\"", ad_name),
            Notification::AdClosed { ad_name, .. } => format!("Listing closed: \"{}\"", ad_name),
            Notification::Unsubscribed { .. } => "Unsubscribed from listing".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::ConfirmationRequest { ad_name, confirm_url } => format!(
                "To confirm your subscription to price changes of \"{}\", follow the link {}",
                ad_name, confirm_url
            ),
            Notification::SubscriptionConfirmed { ad_name } => {
                format!("Your subscription to price changes of \"{}\" is confirmed!", ad_name)
            }
            Notification::PriceChanged { ad_name, new_price } => format!(
                "The price of the listing \"{}\" you are watching has changed. New price: {}.",
                ad_name, new_price
            ),
            Notification::AdClosed { ad_name, link } => {
                format!("The listing \"{}\" ({}) has been closed.", ad_name, link)
            }
            Notification::Unsubscribed { link } => {
                format!("Your subscription to price changes of {} has been cancelled.", link)
            }
        }
    }
}

/// Outbound delivery of [`Notification`]s.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, receiver: &str, notification: Notification) -> Result<()>;
}

/// Shorthands for the two messages a monitoring run emits.
#[async_trait]
pub trait NotifierExt: Notifier {
    async fn send_closed(&self, receiver: &str, ad_name: &str, link: &str) -> Result<()> {
        self.send(
            receiver,
            Notification::AdClosed {
                ad_name: ad_name.to_string(),
                link: link.to_string(),
            },
        )
        .await
    }

    async fn send_price_changed(
        &self,
        receiver: &str,
        ad_name: &str,
        new_price: i64,
    ) -> Result<()> {
        self.send(
            receiver,
            Notification::PriceChanged {
                ad_name: ad_name.to_string(),
                new_price,
            },
        )
        .await
    }
}

impl<T: Notifier + ?Sized> NotifierExt for T {}
