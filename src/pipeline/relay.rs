// src/pipeline/relay.rs

//! Run entry points: wire sources, store, and notifier into one engine run.
//!
//! Every source is read before the engine is started, so an unreachable
//! source aborts the run before anything is sent.

use std::collections::HashSet;

use reqwest::Client;

use crate::error::Result;
use crate::models::{CommentsConfig, Config, ContentItem, DeliveryConfig, FeedConfig};
use crate::pipeline::engine::{DeliveryEngine, EngineSettings, RelayOutcome};
use crate::services::{
    CommentSource, DiscordWebhook, FeedSource, Notifier, RssFeed, SteamComments,
    post_id_from_link,
};
use crate::storage::{JsonFileStore, WatermarkStore};

/// Comment threads of one application: its news feed and thread source.
pub struct AppThreads {
    pub news_url: String,
    pub source: Box<dyn CommentSource>,
}

/// Relay comment threads under the newest announcements of every configured app.
pub async fn run_comments(config: &Config, client: &Client) -> Result<RelayOutcome> {
    log::info!(
        "Relaying comments for {} apps to {} destinations",
        config.comments.app_ids.len(),
        config.delivery.destinations().len()
    );

    let mut store = JsonFileStore::open(&config.comments.store_path).await?;

    let mut apps = Vec::with_capacity(config.comments.app_ids.len());
    for &app_id in &config.comments.app_ids {
        let source = SteamComments::connect(client.clone(), app_id).await?;
        apps.push(AppThreads {
            news_url: SteamComments::rss_url(app_id),
            source: Box::new(source),
        });
    }

    let news = RssFeed::new(client.clone());
    let notifier = DiscordWebhook::new(client.clone(), &config.webhook);

    relay_comments(
        &mut store,
        &news,
        &mut apps,
        &notifier,
        &config.comments,
        &config.delivery,
    )
    .await
}

/// Relay entries of every configured feed.
pub async fn run_feed(config: &Config, client: &Client) -> Result<RelayOutcome> {
    log::info!(
        "Relaying {} feeds to {} destinations",
        config.feed.urls.len(),
        config.delivery.destinations().len()
    );

    let mut store = JsonFileStore::open(&config.feed.store_path).await?;
    let source = RssFeed::new(client.clone());
    let notifier = DiscordWebhook::new(client.clone(), &config.webhook);

    relay_feeds(&mut store, &source, &notifier, &config.feed, &config.delivery).await
}

/// Comments relay over arbitrary sources.
pub async fn relay_comments(
    store: &mut dyn WatermarkStore,
    news: &dyn FeedSource,
    apps: &mut [AppThreads],
    notifier: &dyn Notifier,
    comments: &CommentsConfig,
    delivery: &DeliveryConfig,
) -> Result<RelayOutcome> {
    let authors: HashSet<String> = comments.user_ids.iter().map(u64::to_string).collect();

    let mut items = Vec::new();
    for app in apps.iter_mut() {
        let posts = news
            .fetch(&app.news_url, Some(comments.article_count))
            .await?;
        items.extend(collect_threads(app.source.as_mut(), &posts, &authors).await?);
    }

    let mut engine = DeliveryEngine::new(store, notifier, EngineSettings::from_config(delivery));
    let outcome = engine.relay_thread(items, comments.max_age()).await?;

    log::info!(
        "Comments: {} considered, {} delivered",
        outcome.items,
        outcome.delivered()
    );
    Ok(outcome)
}

/// Feed relay over an arbitrary source.
pub async fn relay_feeds(
    store: &mut dyn WatermarkStore,
    source: &dyn FeedSource,
    notifier: &dyn Notifier,
    feed: &FeedConfig,
    delivery: &DeliveryConfig,
) -> Result<RelayOutcome> {
    let mut batches = Vec::with_capacity(feed.urls.len());
    for url in &feed.urls {
        batches.push(source.fetch(url, feed.limit).await?);
    }

    let mut engine = DeliveryEngine::new(store, notifier, EngineSettings::from_config(delivery));
    let outcome = engine
        .relay_feeds(batches, feed.max_age(), feed.force_recent)
        .await?;

    log::info!(
        "Feeds: {} considered, {} new, {} updated",
        outcome.items,
        outcome.delivered_new,
        outcome.delivered_updated
    );
    Ok(outcome)
}

/// Fetch the comment thread of every announcement, titled after it.
async fn collect_threads(
    source: &mut dyn CommentSource,
    posts: &[ContentItem],
    authors: &HashSet<String>,
) -> Result<Vec<ContentItem>> {
    let mut items = Vec::new();

    for post in posts {
        let Some(post_id) = post_id_from_link(&post.url) else {
            log::warn!("No announcement id in {}", post.url);
            continue;
        };

        let mut thread = source.fetch(&post_id, authors).await?;
        for comment in &mut thread {
            comment.title.clone_from(&post.title);
        }
        items.extend(thread);
    }

    Ok(items)
}
