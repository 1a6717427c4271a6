//! Delivery decisions.
//!
//! Pure functions deciding whether a content item should be delivered to a
//! destination, given the marker stored for that destination.
//!
//! - **Ordinal mode** (comment threads): deliver when the item's ordinal is
//!   above the stored one and the item is not stale.
//! - **Hash mode** (feed entries): deliver when nothing is stored and the
//!   entry is fresh or forced; re-deliver as an update whenever the stored
//!   digest differs, no matter how old the entry is.
//!
//! Nothing is remembered for items skipped as stale, so a later forced run
//! can still announce them.

use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, Result};
use crate::models::{ContentItem, Marker};

/// Whether a delivery announces something new or an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    New,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Ordinal at or below the stored marker
    AlreadyDelivered,
    /// Digest equal to the stored marker
    Unchanged,
    /// Older than the allowed age and never delivered
    Stale,
}

/// Outcome of evaluating one item against one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Skip(SkipReason),
    Deliver { kind: DeliveryKind, next: Marker },
}

impl Verdict {
    pub fn is_delivery(&self) -> bool {
        matches!(self, Verdict::Deliver { .. })
    }
}

/// Ordinal mode decision.
pub fn evaluate_ordinal(
    item_id: u64,
    age: Duration,
    stored: Option<u64>,
    max_age: Duration,
) -> Verdict {
    if age > max_age {
        return Verdict::Skip(SkipReason::Stale);
    }
    // Absent sorts below every ordinal
    if stored.is_none_or(|marker| item_id > marker) {
        Verdict::Deliver {
            kind: DeliveryKind::New,
            next: Marker::Ordinal(item_id),
        }
    } else {
        Verdict::Skip(SkipReason::AlreadyDelivered)
    }
}

/// Hash mode decision.
pub fn evaluate_hash(
    content_hash: &str,
    age: Duration,
    stored: Option<&str>,
    force: bool,
    max_age: Duration,
) -> Verdict {
    let next = || Marker::Hash(content_hash.to_string());

    match stored {
        Some(previous) if previous == content_hash => Verdict::Skip(SkipReason::Unchanged),
        Some(_) => Verdict::Deliver {
            kind: DeliveryKind::Updated,
            next: next(),
        },
        None if force || age <= max_age => Verdict::Deliver {
            kind: DeliveryKind::New,
            next: next(),
        },
        None => Verdict::Skip(SkipReason::Stale),
    }
}

/// Evaluates items against stored markers for one run.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub max_age: Duration,
    pub now: DateTime<Utc>,
}

impl DeliveryPolicy {
    pub fn new(max_age: Duration, now: DateTime<Utc>) -> Self {
        Self { max_age, now }
    }

    /// Ordinal mode for a comment-style item.
    pub fn ordinal(&self, item: &ContentItem, stored: Option<&Marker>) -> Result<Verdict> {
        let item_id = item.item_id.ok_or_else(|| {
            AppError::validation(format!(
                "item {} in group {} has no ordinal",
                item.url, item.group_key
            ))
        })?;
        let stored = stored
            .map(|marker| {
                marker.as_ordinal().ok_or_else(|| AppError::MarkerKind {
                    group: item.group_key.clone(),
                    expected: "ordinal",
                })
            })
            .transpose()?;

        Ok(evaluate_ordinal(
            item_id,
            item.age(self.now),
            stored,
            self.max_age,
        ))
    }

    /// Hash mode for a feed-style item whose formatted body hashes to `content_hash`.
    pub fn hash(
        &self,
        item: &ContentItem,
        content_hash: &str,
        stored: Option<&Marker>,
        force: bool,
    ) -> Result<Verdict> {
        let stored = stored
            .map(|marker| {
                marker.as_hash().ok_or_else(|| AppError::MarkerKind {
                    group: item.group_key.clone(),
                    expected: "hash",
                })
            })
            .transpose()?;

        Ok(evaluate_hash(
            content_hash,
            item.age(self.now),
            stored,
            force,
            self.max_age,
        ))
    }
}
