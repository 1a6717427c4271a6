//! Delivery event hooks.
//!
//! The engine reports every decision it acts on through an injected
//! observer instead of a process-wide logger.

use crate::error::AppError;
use crate::models::ContentItem;
use crate::pipeline::policy::{DeliveryKind, SkipReason};
use crate::utils::redact_webhook;

pub trait DeliveryObserver: Send + Sync {
    fn delivered(&self, destination: &str, item: &ContentItem, kind: DeliveryKind);

    fn skipped(&self, destination: &str, item: &ContentItem, reason: SkipReason);

    fn failed(&self, destination: &str, item: &ContentItem, error: &AppError);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl DeliveryObserver for LogObserver {
    fn delivered(&self, destination: &str, item: &ContentItem, kind: DeliveryKind) {
        let label = match kind {
            DeliveryKind::New => "new",
            DeliveryKind::Updated => "updated",
        };
        log::info!(
            "Delivered {} item {} ({}) by {} to {}",
            label,
            item.url,
            item.group_key,
            item.author.name,
            redact_webhook(destination)
        );
    }

    fn skipped(&self, destination: &str, item: &ContentItem, reason: SkipReason) {
        log::debug!(
            "Skipped item {} for {}: {:?}",
            item.url,
            redact_webhook(destination),
            reason
        );
    }

    fn failed(&self, destination: &str, item: &ContentItem, error: &AppError) {
        log::error!(
            "Failed to deliver {} to {}: {}",
            item.url,
            redact_webhook(destination),
            error
        );
    }
}
