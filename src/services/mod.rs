//! Service layer: everything that talks to the network.
//!
//! - Comment threads (`SteamComments`)
//! - RSS/Atom feeds (`RssFeed`)
//! - Chat webhooks (`DiscordWebhook`)

mod comments;
mod feed;
mod webhook;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ContentItem, Notification};

pub use comments::{SteamComments, parse_comments, parse_group_id, post_id_from_link};
pub use feed::{RssFeed, parse_feed};
pub use webhook::DiscordWebhook;

/// Source of comment-style items.
#[async_trait]
pub trait CommentSource: Send {
    /// Comments of one group, ascending by ordinal.
    ///
    /// `authors` is an allow-set of author ids; empty means everyone.
    async fn fetch(
        &mut self,
        group_id: &str,
        authors: &HashSet<String>,
    ) -> Result<Vec<ContentItem>>;
}

/// Source of feed-style items.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Entries of the feed at `locator` in source order (newest first),
    /// at most `limit` of them.
    async fn fetch(&self, locator: &str, limit: Option<usize>) -> Result<Vec<ContentItem>>;
}

/// Outbound message transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, destination: &str, message: &Notification) -> Result<()>;
}
