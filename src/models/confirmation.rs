use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Links one recipient to one ad. Only confirmed records receive
/// monitoring notifications.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Confirmation {
    pub id: String,
    pub email: String,
    pub ad_id: String,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of the subscribe and unsubscribe requests.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionRequest {
    #[validate(url)]
    pub link: String,
    #[validate(email)]
    pub receiver: String,
}

/// Recipient address and ad name behind a confirmation id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct SubscriptionDetails {
    pub email: String,
    pub name: String,
}
