use serde::{Deserialize, Serialize};

use crate::models::{Ad, Snapshot};

/// What a fresh snapshot means for a stored, non-removed ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Unchanged,
    PriceChanged(i64),
    Removed,
}

/// Removal wins over any price difference.
pub fn classify(ad: &Ad, snapshot: &Snapshot) -> Change {
    if snapshot.removed {
        Change::Removed
    } else if snapshot.price != ad.price {
        Change::PriceChanged(snapshot.price)
    } else {
        Change::Unchanged
    }
}
