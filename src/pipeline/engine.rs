//! Incremental delivery engine.
//!
//! Classifies content items per destination, dispatches accepted ones in a
//! defined order through the notifier, and keeps the watermark store in step
//! with what was actually sent.
//!
//! ## Run Semantics
//!
//! - A marker is recorded only after its dispatch succeeded, and immediately,
//!   so later items of the same run compare against it.
//! - The first failed dispatch aborts the run. Markers already advanced stay
//!   advanced in memory, the end-of-run persist is skipped.
//! - The store is persisted once at the end of a completed run, and also
//!   after every dispatch when `persist_each_dispatch` is set.
//! - Comment threads are dispatched in ascending ordinal order. Feed batches
//!   are classified completely first and then dispatched oldest first.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Category, ContentItem, DeliveryConfig, Marker, Notification, content_hash};
use crate::pipeline::format::{Formatter, MarkdownFormatter, truncate};
use crate::pipeline::observer::{DeliveryObserver, LogObserver};
use crate::pipeline::policy::{DeliveryKind, DeliveryPolicy, SkipReason, Verdict};
use crate::pipeline::rate_limit::RateLimiter;
use crate::services::Notifier;
use crate::storage::WatermarkStore;

static DEFAULT_FORMATTER: MarkdownFormatter = MarkdownFormatter;
static DEFAULT_OBSERVER: LogObserver = LogObserver;

/// Dispatch settings for one engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Destinations, iterated in this order for every item
    pub destinations: Vec<String>,
    pub truncate_length: usize,
    pub rate_limit: Duration,
    pub persist_each_dispatch: bool,
}

impl EngineSettings {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            destinations: config.destinations(),
            truncate_length: config.truncate_length,
            rate_limit: config.rate_limit(),
            persist_each_dispatch: config.persist_each_dispatch,
        }
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Items considered after ordering and de-duplication
    pub items: usize,
    pub delivered_new: usize,
    pub delivered_updated: usize,
    /// Already delivered or unchanged, per destination
    pub skipped_seen: usize,
    /// Too old to announce, per destination
    pub skipped_stale: usize,
}

impl RelayOutcome {
    pub fn delivered(&self) -> usize {
        self.delivered_new + self.delivered_updated
    }

    pub fn merge(&mut self, other: &RelayOutcome) {
        self.items += other.items;
        self.delivered_new += other.delivered_new;
        self.delivered_updated += other.delivered_updated;
        self.skipped_seen += other.skipped_seen;
        self.skipped_stale += other.skipped_stale;
    }

    fn count_delivery(&mut self, kind: DeliveryKind) {
        match kind {
            DeliveryKind::New => self.delivered_new += 1,
            DeliveryKind::Updated => self.delivered_updated += 1,
        }
    }

    fn count_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Stale => self.skipped_stale += 1,
            SkipReason::AlreadyDelivered | SkipReason::Unchanged => self.skipped_seen += 1,
        }
    }
}

/// A classified feed delivery waiting for dispatch.
struct Pending {
    index: usize,
    destination: String,
    kind: DeliveryKind,
    next: Marker,
}

pub struct DeliveryEngine<'a> {
    store: &'a mut dyn WatermarkStore,
    notifier: &'a dyn Notifier,
    formatter: &'a dyn Formatter,
    observer: &'a dyn DeliveryObserver,
    limiter: RateLimiter,
    settings: EngineSettings,
    fixed_now: Option<DateTime<Utc>>,
}

impl<'a> DeliveryEngine<'a> {
    pub fn new(
        store: &'a mut dyn WatermarkStore,
        notifier: &'a dyn Notifier,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            formatter: &DEFAULT_FORMATTER,
            observer: &DEFAULT_OBSERVER,
            limiter: RateLimiter::new(settings.rate_limit),
            settings,
            fixed_now: None,
        }
    }

    pub fn with_formatter(mut self, formatter: &'a dyn Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn DeliveryObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Evaluate ages against a fixed instant instead of the wall clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Relay comment-style items (ordinal mode).
    ///
    /// Items are processed in ascending ordinal order; items older than
    /// `max_age` are never delivered.
    pub async fn relay_thread(
        &mut self,
        mut items: Vec<ContentItem>,
        max_age: chrono::Duration,
    ) -> Result<RelayOutcome> {
        items.sort_by_key(|item| item.item_id);

        let policy = DeliveryPolicy::new(max_age, self.now());
        let destinations = self.settings.destinations.clone();
        let mut outcome = RelayOutcome {
            items: items.len(),
            ..RelayOutcome::default()
        };

        for item in &items {
            let mut body = None;

            for destination in &destinations {
                let stored = self.store.get(destination, &item.group_key);
                match policy.ordinal(item, stored.as_ref())? {
                    Verdict::Skip(reason) => {
                        self.observer.skipped(destination, item, reason);
                        outcome.count_skip(reason);
                    }
                    Verdict::Deliver { kind, next } => {
                        let body = body.get_or_insert_with(|| self.formatter.format(&item.body));
                        let message = self.compose(item, body, kind, Category::Comment);
                        self.deliver(destination, item, &message, kind, next).await?;
                        outcome.count_delivery(kind);
                    }
                }
            }
        }

        self.store.persist().await?;
        Ok(outcome)
    }

    /// Relay feed-style items (hash mode).
    ///
    /// `items` are in source order, newest first. The first `force_recent`
    /// items are announced even when older than `max_age`. The whole batch
    /// is classified before anything is sent, then dispatched oldest first.
    pub async fn relay_feed(
        &mut self,
        items: Vec<ContentItem>,
        max_age: chrono::Duration,
        force_recent: usize,
    ) -> Result<RelayOutcome> {
        self.relay_feeds(vec![items], max_age, force_recent).await
    }

    /// Relay several feed batches in one run.
    ///
    /// Each batch is handled as by [`relay_feed`](Self::relay_feed), in the
    /// given order; the store is persisted once, after the last batch.
    pub async fn relay_feeds(
        &mut self,
        batches: Vec<Vec<ContentItem>>,
        max_age: chrono::Duration,
        force_recent: usize,
    ) -> Result<RelayOutcome> {
        let policy = DeliveryPolicy::new(max_age, self.now());
        let mut outcome = RelayOutcome::default();

        for batch in batches {
            let run = self.dispatch_feed_batch(batch, &policy, force_recent).await?;
            outcome.merge(&run);
        }

        self.store.persist().await?;
        Ok(outcome)
    }

    async fn dispatch_feed_batch(
        &mut self,
        mut items: Vec<ContentItem>,
        policy: &DeliveryPolicy,
        force_recent: usize,
    ) -> Result<RelayOutcome> {
        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.group_key.clone()));

        let destinations = self.settings.destinations.clone();
        let mut outcome = RelayOutcome {
            items: items.len(),
            ..RelayOutcome::default()
        };

        let bodies: Vec<String> = items
            .iter()
            .map(|item| self.formatter.format(&item.body))
            .collect();

        let mut pending = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let hash = content_hash(&bodies[index]);
            let force = index < force_recent;

            for destination in &destinations {
                let stored = self.store.get(destination, &item.group_key);
                match policy.hash(item, &hash, stored.as_ref(), force)? {
                    Verdict::Skip(reason) => {
                        self.observer.skipped(destination, item, reason);
                        outcome.count_skip(reason);
                    }
                    Verdict::Deliver { kind, next } => pending.push(Pending {
                        index,
                        destination: destination.clone(),
                        kind,
                        next,
                    }),
                }
            }
        }

        // Oldest first; stable, so destination order is kept per item
        pending.sort_by(|a, b| b.index.cmp(&a.index));

        for Pending {
            index,
            destination,
            kind,
            next,
        } in pending
        {
            let item = &items[index];
            let category = match kind {
                DeliveryKind::New => Category::NewEntry,
                DeliveryKind::Updated => Category::UpdatedEntry,
            };
            let message = self.compose(item, &bodies[index], kind, category);
            self.deliver(&destination, item, &message, kind, next).await?;
            outcome.count_delivery(kind);
        }

        Ok(outcome)
    }

    fn compose(
        &self,
        item: &ContentItem,
        body: &str,
        kind: DeliveryKind,
        category: Category,
    ) -> Notification {
        let title = match (kind, category) {
            (DeliveryKind::Updated, _) => format!("Updated: {}", item.title),
            (_, Category::Comment) => format!("re: {}", item.title),
            _ => item.title.clone(),
        };

        Notification {
            title,
            body: truncate(body, self.settings.truncate_length, item.group_url()),
            link: item.url.clone(),
            timestamp: item.timestamp,
            author_name: item.author.name.clone(),
            author_avatar: item.author.avatar_url.clone(),
            category,
        }
    }

    /// Dispatch one message and advance the marker on success.
    async fn deliver(
        &mut self,
        destination: &str,
        item: &ContentItem,
        message: &Notification,
        kind: DeliveryKind,
        next: Marker,
    ) -> Result<()> {
        self.limiter.wait(destination).await;

        if let Err(error) = self.notifier.deliver(destination, message).await {
            self.observer.failed(destination, item, &error);
            return Err(error);
        }

        self.limiter.record(destination);
        self.store.put(destination, &item.group_key, next);
        self.observer.delivered(destination, item, kind);

        if self.settings.persist_each_dispatch {
            self.store.persist().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Author;
    use crate::storage::{JsonFileStore, Ledger};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const HOOK_A: &str = "https://discord.com/api/webhooks/1/aaa";
    const HOOK_B: &str = "https://discord.com/api/webhooks/2/bbb";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn settings(destinations: &[&str]) -> EngineSettings {
        EngineSettings {
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            truncate_length: 2048,
            rate_limit: Duration::ZERO,
            persist_each_dispatch: false,
        }
    }

    fn comment(group: &str, id: u64, body: &str) -> ContentItem {
        ContentItem {
            group_key: group.to_string(),
            item_id: Some(id),
            title: "Patch 1.2".to_string(),
            author: Author::new("257266967", "dev"),
            timestamp: now() - chrono::Duration::hours(1),
            body: body.to_string(),
            url: format!("https://example.com/detail/{group}#comment_{id}"),
        }
    }

    fn entry(key: &str, body: &str, age_hours: i64) -> ContentItem {
        ContentItem {
            group_key: key.to_string(),
            item_id: None,
            title: format!("Entry {key}"),
            author: Author::new("", "blog"),
            timestamp: now() - chrono::Duration::hours(age_hours),
            body: body.to_string(),
            url: format!("https://example.com/posts/{key}"),
        }
    }

    /// Records deliveries; fails on the `fail_at`-th call (0-based).
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Notification)>>,
        fail_at: Option<usize>,
        calls: Mutex<usize>,
    }

    impl RecordingNotifier {
        fn failing_at(n: usize) -> Self {
            Self {
                fail_at: Some(n),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, Notification)> {
            self.sent.lock().unwrap().clone()
        }

        fn titles(&self) -> Vec<String> {
            self.sent().into_iter().map(|(_, n)| n.title).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, destination: &str, message: &Notification) -> Result<()> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            if self.fail_at == Some(call) {
                return Err(AppError::delivery_failed(destination, "HTTP 500"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), message.clone()));
            Ok(())
        }
    }

    /// In-memory store counting persists.
    #[derive(Default)]
    struct CountingStore {
        ledger: Ledger,
        persists: Mutex<usize>,
    }

    impl CountingStore {
        fn persists(&self) -> usize {
            *self.persists.lock().unwrap()
        }
    }

    #[async_trait]
    impl WatermarkStore for CountingStore {
        fn get(&self, destination: &str, group_key: &str) -> Option<Marker> {
            self.ledger.get(destination)?.get(group_key).cloned()
        }

        fn put(&mut self, destination: &str, group_key: &str, marker: Marker) {
            self.ledger
                .entry(destination.to_string())
                .or_default()
                .insert(group_key.to_string(), marker);
        }

        async fn persist(&self) -> Result<()> {
            *self.persists.lock().unwrap() += 1;
            Ok(())
        }

        fn ledger(&self) -> &Ledger {
            &self.ledger
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl DeliveryObserver for RecordingObserver {
        fn delivered(&self, _: &str, item: &ContentItem, kind: DeliveryKind) {
            self.events
                .lock()
                .unwrap()
                .push(format!("delivered {} {:?}", item.url, kind));
        }

        fn skipped(&self, _: &str, item: &ContentItem, reason: SkipReason) {
            self.events
                .lock()
                .unwrap()
                .push(format!("skipped {} {:?}", item.url, reason));
        }

        fn failed(&self, _: &str, item: &ContentItem, _: &AppError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("failed {}", item.url));
        }
    }

    #[tokio::test]
    async fn scenario_new_repeat_then_next_comment() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comments.json");
        let max_age = chrono::Duration::days(7);

        // First run: nothing stored, id 5 is delivered
        let notifier = RecordingNotifier::default();
        let mut store = JsonFileStore::open(&path).await.unwrap();
        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_thread(vec![comment("G", 5, "hello")], max_age)
            .await
            .unwrap();
        assert_eq!(outcome.delivered_new, 1);
        assert_eq!(notifier.sent()[0].1.body, "hello");
        assert_eq!(notifier.sent()[0].1.title, "re: Patch 1.2");

        // Second run: same item, nothing delivered
        let notifier = RecordingNotifier::default();
        let mut store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get(HOOK_A, "G"), Some(Marker::Ordinal(5)));
        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_thread(vec![comment("G", 5, "hello")], max_age)
            .await
            .unwrap();
        assert_eq!(outcome.delivered(), 0);
        assert_eq!(outcome.skipped_seen, 1);
        assert!(notifier.sent().is_empty());

        // Third run: id 6 arrives, only it is delivered
        let notifier = RecordingNotifier::default();
        let mut store = JsonFileStore::open(&path).await.unwrap();
        DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_thread(
                vec![comment("G", 5, "hello"), comment("G", 6, "again")],
                max_age,
            )
            .await
            .unwrap();
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].1.body, "again");

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get(HOOK_A, "G"), Some(Marker::Ordinal(6)));
    }

    #[tokio::test]
    async fn thread_items_are_sorted_and_marker_updates_within_run() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();

        let items = vec![
            comment("G", 9, "nine"),
            comment("G", 7, "seven"),
            comment("G", 8, "eight"),
        ];
        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_thread(items, chrono::Duration::days(1))
            .await
            .unwrap();

        let bodies: Vec<String> = notifier.sent().into_iter().map(|(_, n)| n.body).collect();
        assert_eq!(bodies, vec!["seven", "eight", "nine"]);
        assert_eq!(outcome.delivered_new, 3);
        assert_eq!(store.get(HOOK_A, "G"), Some(Marker::Ordinal(9)));
        assert_eq!(store.persists(), 1);
    }

    #[tokio::test]
    async fn destinations_diverge_on_their_own_markers() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();
        store.put(HOOK_A, "G", Marker::Ordinal(5));

        DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A, HOOK_B]))
            .with_now(now())
            .relay_thread(vec![comment("G", 5, "five")], chrono::Duration::days(1))
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, HOOK_B);
        assert_eq!(store.get(HOOK_B, "G"), Some(Marker::Ordinal(5)));
    }

    #[tokio::test]
    async fn stale_comment_leaves_no_marker() {
        let notifier = RecordingNotifier::default();
        let observer = RecordingObserver::default();
        let mut store = CountingStore::default();

        let mut old = comment("G", 3, "old");
        old.timestamp = now() - chrono::Duration::days(30);

        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_observer(&observer)
            .with_now(now())
            .relay_thread(vec![old], chrono::Duration::days(1))
            .await
            .unwrap();

        assert_eq!(outcome.skipped_stale, 1);
        assert_eq!(store.get(HOOK_A, "G"), None);
        assert_eq!(
            observer.events.lock().unwrap().clone(),
            vec!["skipped https://example.com/detail/G#comment_3 Stale"]
        );
    }

    #[tokio::test]
    async fn failure_aborts_run_and_keeps_earlier_markers() {
        let notifier = RecordingNotifier::failing_at(1);
        let observer = RecordingObserver::default();
        let mut store = CountingStore::default();

        let items = vec![
            comment("G", 1, "one"),
            comment("G", 2, "two"),
            comment("G", 3, "three"),
        ];
        let err = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_observer(&observer)
            .with_now(now())
            .relay_thread(items, chrono::Duration::days(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DeliveryFailed { .. }));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(store.get(HOOK_A, "G"), Some(Marker::Ordinal(1)));
        assert_eq!(store.persists(), 0);
        assert_eq!(
            observer.events.lock().unwrap().last().unwrap(),
            "failed https://example.com/detail/G#comment_2"
        );
    }

    #[tokio::test]
    async fn failure_without_persist_redelivers_next_run() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comments.json");

        let notifier = RecordingNotifier::failing_at(1);
        let mut store = JsonFileStore::open(&path).await.unwrap();
        let items = vec![comment("G", 1, "one"), comment("G", 2, "two")];
        assert!(
            DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
                .with_now(now())
                .relay_thread(items.clone(), chrono::Duration::days(1))
                .await
                .is_err()
        );
        assert!(!path.exists());

        let notifier = RecordingNotifier::default();
        let mut store = JsonFileStore::open(&path).await.unwrap();
        DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_thread(items, chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn persist_each_dispatch_keeps_partial_progress() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comments.json");

        let notifier = RecordingNotifier::failing_at(1);
        let mut store = JsonFileStore::open(&path).await.unwrap();
        let mut config = settings(&[HOOK_A]);
        config.persist_each_dispatch = true;

        let items = vec![comment("G", 1, "one"), comment("G", 2, "two")];
        assert!(
            DeliveryEngine::new(&mut store, &notifier, config)
                .with_now(now())
                .relay_thread(items, chrono::Duration::days(1))
                .await
                .is_err()
        );

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(HOOK_A, "G"), Some(Marker::Ordinal(1)));
    }

    #[tokio::test]
    async fn mismatched_marker_kind_is_an_error() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();
        store.put(HOOK_A, "G", Marker::digest("x"));

        let err = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_thread(vec![comment("G", 1, "one")], chrono::Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MarkerKind { .. }));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn feed_dispatches_oldest_first() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();

        // Source order: newest first
        let items = vec![entry("A", "a", 1), entry("B", "b", 2), entry("C", "c", 3)];
        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A, HOOK_B]))
            .with_now(now())
            .relay_feed(items, chrono::Duration::days(1), 0)
            .await
            .unwrap();

        let sent: Vec<(String, String)> = notifier
            .sent()
            .into_iter()
            .map(|(d, n)| (d, n.title))
            .collect();
        assert_eq!(
            sent,
            vec![
                (HOOK_A.to_string(), "Entry C".to_string()),
                (HOOK_B.to_string(), "Entry C".to_string()),
                (HOOK_A.to_string(), "Entry B".to_string()),
                (HOOK_B.to_string(), "Entry B".to_string()),
                (HOOK_A.to_string(), "Entry A".to_string()),
                (HOOK_B.to_string(), "Entry A".to_string()),
            ]
        );
        assert_eq!(outcome.delivered_new, 6);
        assert_eq!(store.persists(), 1);
        assert!(notifier.sent().iter().all(|(_, n)| n.category == Category::NewEntry));
    }

    #[tokio::test]
    async fn feed_update_is_detected_once() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();
        let max_age = chrono::Duration::days(1);

        DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feed(vec![entry("A", "<p>first</p>", 1)], max_age, 0)
            .await
            .unwrap();

        // Edited long after publication: still reported, as an update
        let edited = entry("A", "<p>second</p>", 24 * 30);
        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feed(vec![edited.clone()], max_age, 0)
            .await
            .unwrap();
        assert_eq!(outcome.delivered_updated, 1);

        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feed(vec![edited], max_age, 0)
            .await
            .unwrap();
        assert_eq!(outcome.delivered(), 0);
        assert_eq!(outcome.skipped_seen, 1);

        assert_eq!(notifier.titles(), vec!["Entry A", "Updated: Entry A"]);
        assert_eq!(notifier.sent()[1].1.category, Category::UpdatedEntry);
        assert_eq!(store.get(HOOK_A, "A"), Some(Marker::digest("second")));
    }

    #[tokio::test]
    async fn feed_stale_entries_skip_until_forced() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();
        let max_age = chrono::Duration::hours(24);
        let items = || vec![entry("A", "a", 48), entry("B", "b", 72)];

        for _ in 0..2 {
            let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
                .with_now(now())
                .relay_feed(items(), max_age, 0)
                .await
                .unwrap();
            assert_eq!(outcome.skipped_stale, 2);
            assert!(store.ledger().is_empty());
        }

        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feed(items(), max_age, 1)
            .await
            .unwrap();
        assert_eq!(outcome.delivered_new, 1);
        assert_eq!(outcome.skipped_stale, 1);
        assert_eq!(notifier.titles(), vec!["Entry A"]);
        assert_eq!(store.get(HOOK_A, "B"), None);
    }

    #[tokio::test]
    async fn feed_failure_dispatches_nothing_newer() {
        let notifier = RecordingNotifier::failing_at(0);
        let mut store = CountingStore::default();

        let items = vec![entry("A", "a", 1), entry("B", "b", 2)];
        assert!(
            DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
                .with_now(now())
                .relay_feed(items, chrono::Duration::days(1), 0)
                .await
                .is_err()
        );
        assert!(notifier.sent().is_empty());
        assert!(store.ledger().is_empty());
        assert_eq!(store.persists(), 0);
    }

    #[tokio::test]
    async fn feed_duplicate_entries_are_sent_once() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();

        let items = vec![entry("A", "newer", 1), entry("A", "older", 2)];
        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feed(items, chrono::Duration::days(1), 0)
            .await
            .unwrap();
        assert_eq!(outcome.items, 1);
        assert_eq!(notifier.sent()[0].1.body, "newer");
    }

    #[tokio::test]
    async fn long_bodies_are_truncated_with_group_link() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();
        let mut config = settings(&[HOOK_A]);
        config.truncate_length = 300;

        let body = "line of text<br>".repeat(100);
        DeliveryEngine::new(&mut store, &notifier, config)
            .with_now(now())
            .relay_thread(vec![comment("G", 1, &body)], chrono::Duration::days(1))
            .await
            .unwrap();

        let message = &notifier.sent()[0].1;
        assert!(message.body.chars().count() <= 300);
        assert!(
            message
                .body
                .ends_with("[Read more](https://example.com/detail/G)")
        );
        assert_eq!(message.link, "https://example.com/detail/G#comment_1");
    }

    #[tokio::test]
    async fn no_destinations_still_persists() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();

        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[]))
            .relay_thread(vec![comment("G", 1, "one")], chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(outcome.delivered(), 0);
        assert_eq!(store.persists(), 1);
    }

    #[tokio::test]
    async fn feed_batches_persist_once_per_run() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();

        let outcome = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feeds(
                vec![
                    vec![entry("a", "alpha", 1)],
                    vec![entry("b", "beta", 1)],
                    vec![entry("c", "gamma", 1)],
                ],
                chrono::Duration::days(7),
                0,
            )
            .await
            .unwrap();
        assert_eq!(outcome.delivered_new, 3);
        assert_eq!(notifier.titles(), vec!["Entry a", "Entry b", "Entry c"]);
        assert_eq!(store.persists(), 1);
    }

    #[tokio::test]
    async fn failure_in_later_feed_batch_skips_persist() {
        let notifier = RecordingNotifier::failing_at(1);
        let mut store = CountingStore::default();

        let err = DeliveryEngine::new(&mut store, &notifier, settings(&[HOOK_A]))
            .with_now(now())
            .relay_feeds(
                vec![vec![entry("a", "alpha", 1)], vec![entry("b", "beta", 1)]],
                chrono::Duration::days(7),
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailed { .. }));
        assert_eq!(notifier.titles(), vec!["Entry a"]);
        assert_eq!(store.persists(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_to_one_host_are_spaced_by_rate_limit() {
        let notifier = RecordingNotifier::default();
        let mut store = CountingStore::default();
        let mut config = settings(&[HOOK_A, HOOK_B]);
        config.rate_limit = Duration::from_secs(60);

        let start = tokio::time::Instant::now();
        DeliveryEngine::new(&mut store, &notifier, config)
            .with_now(now())
            .relay_thread(
                vec![comment("G", 1, "one"), comment("G", 2, "two")],
                chrono::Duration::days(1),
            )
            .await
            .unwrap();

        // Four dispatches on discord.com, three waits
        assert_eq!(notifier.sent().len(), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(180));
        assert!(elapsed < Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dispatch_leaves_rate_limit_slot_free() {
        let notifier = RecordingNotifier::failing_at(0);
        let mut store = CountingStore::default();
        let mut config = settings(&[HOOK_A]);
        config.rate_limit = Duration::from_secs(60);
        let max_age = chrono::Duration::days(1);

        let mut engine = DeliveryEngine::new(&mut store, &notifier, config).with_now(now());
        assert!(
            engine
                .relay_thread(vec![comment("G", 1, "one")], max_age)
                .await
                .is_err()
        );

        // Nothing was recorded, so the retry goes out immediately
        let start = tokio::time::Instant::now();
        engine
            .relay_thread(vec![comment("G", 1, "one")], max_age)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        // The successful dispatch did take the slot
        let start = tokio::time::Instant::now();
        engine
            .relay_thread(vec![comment("G", 2, "two")], max_age)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));

        drop(engine);
        assert_eq!(notifier.titles(), vec!["re: Patch 1.2", "re: Patch 1.2"]);
    }

    #[test]
    fn outcome_merge() {
        let mut total = RelayOutcome::default();
        total.merge(&RelayOutcome {
            items: 2,
            delivered_new: 1,
            delivered_updated: 1,
            skipped_seen: 3,
            skipped_stale: 4,
        });
        total.merge(&RelayOutcome {
            items: 1,
            delivered_new: 1,
            ..RelayOutcome::default()
        });
        assert_eq!(total.items, 3);
        assert_eq!(total.delivered(), 3);
        assert_eq!(total.skipped_stale, 4);
    }
}
