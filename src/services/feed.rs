// src/services/feed.rs

//! RSS/Atom feed source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Author, ContentItem};
use crate::services::FeedSource;

/// Feed source over HTTP.
pub struct RssFeed {
    client: Client,
}

impl RssFeed {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch(&self, locator: &str, limit: Option<usize>) -> Result<Vec<ContentItem>> {
        let source = format!("feed {locator}");

        let bytes = self
            .client
            .get(locator)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::source_unavailable(&source, e))?
            .bytes()
            .await
            .map_err(|e| AppError::source_unavailable(&source, e))?;

        let entries = parse_feed(&bytes, limit, Utc::now())
            .map_err(|e| AppError::source_unavailable(&source, e))?;

        log::info!("Fetched {} entries from {}", entries.len(), locator);
        Ok(entries)
    }
}

/// Parse an RSS or Atom document into items, keeping document order.
///
/// Entries without a timestamp are stamped with `fetched_at`.
pub fn parse_feed(
    content: &[u8],
    limit: Option<usize>,
    fetched_at: DateTime<Utc>,
) -> std::result::Result<Vec<ContentItem>, parser::ParseFeedError> {
    let feed = parser::parse(content)?;

    let feed_author = feed
        .authors
        .first()
        .map(|p| p.name.clone())
        .or_else(|| feed.title.as_ref().map(|t| t.content.clone()))
        .unwrap_or_default();

    let take = limit.unwrap_or(usize::MAX);
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| to_item(entry, &feed_author, fetched_at))
        .take(take)
        .collect())
}

fn to_item(entry: Entry, feed_author: &str, fetched_at: DateTime<Utc>) -> Option<ContentItem> {
    let link = entry.links.first().map(|l| l.href.clone());

    let group_key = if entry.id.is_empty() {
        link.clone()?
    } else {
        entry.id.clone()
    };

    let body = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .unwrap_or_default();

    let author = entry
        .authors
        .first()
        .map(|p| Author::new(p.uri.clone().unwrap_or_default(), p.name.clone()))
        .unwrap_or_else(|| Author::new("", feed_author));

    Some(ContentItem {
        url: link.unwrap_or_else(|| group_key.clone()),
        group_key,
        item_id: None,
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        author,
        timestamp: entry.published.or(entry.updated).unwrap_or(fetched_at),
        body,
    })
}
