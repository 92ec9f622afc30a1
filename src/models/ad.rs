use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::generate_id;

/// A tracked listing as stored by the watcher.
///
/// `link` is unique among ads that are not removed. The monitor only ever
/// holds transient copies of these, loaded at the start of a run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Ad {
    pub id: String,
    pub link: String,
    pub name: String,
    pub price: i64,
    #[sqlx(rename = "is_removed")]
    pub removed: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Ad {
    pub fn new(link: impl Into<String>, name: impl Into<String>, price: i64) -> Self {
        Self {
            id: generate_id(),
            link: link.into(),
            name: name.into(),
            price,
            removed: false,
            last_checked: None,
        }
    }
}

/// Current state of a listing as observed on the hosting site.
///
/// A removed snapshot carries no meaningful name or price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub name: String,
    pub price: i64,
    pub removed: bool,
}

impl Snapshot {
    pub fn active(name: impl Into<String>, price: i64) -> Self {
        Self {
            name: name.into(),
            price,
            removed: false,
        }
    }

    pub fn removed() -> Self {
        Self {
            name: String::new(),
            price: 0,
            removed: true,
        }
    }
}
