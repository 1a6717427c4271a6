// src/services/comments.rs

//! Announcement comment threads on the Steam community site.
//!
//! Comments are rendered server side; the thread endpoint returns a JSON
//! object whose `comments_html` field holds one `div.commentthread_comment`
//! per comment.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Author, ContentItem};
use crate::services::CommentSource;

const COMMUNITY: &str = "https://steamcommunity.com";

static GROUP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"steam://friends/joinchat/([0-9]+)").unwrap());

#[derive(Deserialize)]
struct RenderReply {
    #[serde(default)]
    success: Option<bool>,
    comments_html: String,
}

/// Comment thread source for one application's announcements.
pub struct SteamComments {
    client: Client,
    app_id: u64,
    group_id: u64,
    /// Author records by author id, filled as comments are parsed
    authors: HashMap<String, Author>,
}

impl SteamComments {
    /// Resolve the application's community group and build a source for it.
    pub async fn connect(client: Client, app_id: u64) -> Result<Self> {
        let url = Self::all_news_url(app_id);
        let source = format!("news page {url}");

        let html = client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::source_unavailable(&source, e))?
            .text()
            .await
            .map_err(|e| AppError::source_unavailable(&source, e))?;

        let group_id = parse_group_id(&html).ok_or_else(|| {
            AppError::source_unavailable(&source, "community group id not found")
        })?;
        log::debug!("App {} belongs to community group {}", app_id, group_id);

        Ok(Self::with_group(client, app_id, group_id))
    }

    /// Build a source for an already known community group.
    pub fn with_group(client: Client, app_id: u64, group_id: u64) -> Self {
        Self {
            client,
            app_id,
            group_id,
            authors: HashMap::new(),
        }
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn all_news_url(app_id: u64) -> String {
        format!("{COMMUNITY}/games/{app_id}/allnews/")
    }

    /// Announcement RSS feed of an application.
    pub fn rss_url(app_id: u64) -> String {
        format!("{COMMUNITY}/games/{app_id}/rss/")
    }

    pub fn announcement_url(&self, post_id: &str) -> String {
        format!(
            "{COMMUNITY}/games/{}/announcements/detail/{}",
            self.app_id, post_id
        )
    }

    fn render_url(&self, post_id: &str) -> String {
        format!(
            "{COMMUNITY}/comment/ClanAnnouncement/render/{}/{}",
            self.group_id, post_id
        )
    }
}

#[async_trait]
impl CommentSource for SteamComments {
    async fn fetch(
        &mut self,
        group_id: &str,
        authors: &HashSet<String>,
    ) -> Result<Vec<ContentItem>> {
        let source = format!("comment thread {group_id}");

        // count=0 returns the whole thread
        let text = self
            .client
            .post(self.render_url(group_id))
            .form(&[("start", "0"), ("count", "0")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::source_unavailable(&source, e))?
            .text()
            .await
            .map_err(|e| AppError::source_unavailable(&source, e))?;

        let reply: RenderReply =
            serde_json::from_str(&text).map_err(|e| AppError::source_unavailable(&source, e))?;
        if reply.success == Some(false) {
            return Err(AppError::source_unavailable(&source, "thread render refused"));
        }

        let announcement_url = self.announcement_url(group_id);
        let comments = parse_comments(
            &reply.comments_html,
            group_id,
            &announcement_url,
            authors,
            &mut self.authors,
        )?;

        log::info!(
            "Collected {} comments from thread {}",
            comments.len(),
            group_id
        );
        Ok(comments)
    }
}

/// Find the community group id on an application's news page.
pub fn parse_group_id(html: &str) -> Option<u64> {
    GROUP_ID
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Post id of an announcement link (`.../announcements/detail/<id>`).
pub fn post_id_from_link(link: &str) -> Option<String> {
    let (_, tail) = link.rsplit_once("/detail/")?;
    let id: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

struct CommentSelectors {
    comment: Selector,
    author_link: Selector,
    author_name: Selector,
    avatar: Selector,
    timestamp: Selector,
    text: Selector,
}

impl CommentSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            comment: parse_selector("div.commentthread_comment")?,
            author_link: parse_selector("a.commentthread_author_link")?,
            author_name: parse_selector("bdi")?,
            avatar: parse_selector(".commentthread_comment_avatar img")?,
            timestamp: parse_selector("span.commentthread_comment_timestamp")?,
            text: parse_selector("div.commentthread_comment_text")?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Parse rendered comment thread HTML into items, ascending by ordinal.
///
/// Comments by authors outside a non-empty `allowed` set are dropped.
/// Author records are looked up in and added to `cache`.
pub fn parse_comments(
    html: &str,
    group_key: &str,
    announcement_url: &str,
    allowed: &HashSet<String>,
    cache: &mut HashMap<String, Author>,
) -> Result<Vec<ContentItem>> {
    let selectors = CommentSelectors::new()?;
    let document = Html::parse_fragment(html);
    let mut comments = Vec::new();

    for element in document.select(&selectors.comment) {
        let Some(uid) = element
            .select(&selectors.author_link)
            .next()
            .and_then(|a| a.value().attr("data-miniprofile"))
            .map(str::to_string)
        else {
            log::warn!("Comment without author in thread {}", group_key);
            continue;
        };

        if !allowed.is_empty() && !allowed.contains(&uid) {
            log::debug!("Skipping comment by {}", uid);
            continue;
        }

        let author = cache
            .entry(uid.clone())
            .or_insert_with(|| parse_author(&element, &selectors, &uid))
            .clone();

        match parse_comment(&element, &selectors, author, group_key, announcement_url) {
            Some(comment) => comments.push(comment),
            None => log::warn!("Unparseable comment by {} in thread {}", uid, group_key),
        }
    }

    comments.sort_by_key(|c| c.item_id);
    Ok(comments)
}

fn parse_author(element: &ElementRef<'_>, selectors: &CommentSelectors, uid: &str) -> Author {
    let link = element.select(&selectors.author_link).next();
    let name = link
        .and_then(|a| a.select(&selectors.author_name).next())
        .or(link)
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let author = Author::new(uid, name);
    match element
        .select(&selectors.avatar)
        .next()
        .and_then(|img| img.value().attr("src"))
    {
        Some(src) => author.with_avatar(src),
        None => author,
    }
}

fn parse_comment(
    element: &ElementRef<'_>,
    selectors: &CommentSelectors,
    author: Author,
    group_key: &str,
    announcement_url: &str,
) -> Option<ContentItem> {
    let cid: u64 = element
        .value()
        .attr("id")?
        .strip_prefix("comment_")?
        .parse()
        .ok()?;

    let seconds: i64 = element
        .select(&selectors.timestamp)
        .next()?
        .value()
        .attr("data-timestamp")?
        .parse()
        .ok()?;
    let timestamp = DateTime::from_timestamp(seconds, 0)?;

    let body = element.select(&selectors.text).next()?.inner_html();

    Some(ContentItem {
        group_key: group_key.to_string(),
        item_id: Some(cid),
        title: String::new(),
        author,
        timestamp,
        body: strip_breaks(&body).to_string(),
        url: format!("{announcement_url}#comment_{cid}"),
    })
}

/// Trim whitespace and `<br>` tags from both ends.
fn strip_breaks(html: &str) -> &str {
    const BREAKS: [&str; 3] = ["<br>", "<br/>", "<br />"];
    let mut s = html.trim();
    loop {
        let before = s.len();
        for br in BREAKS {
            s = s.strip_prefix(br).unwrap_or(s).trim_start();
            s = s.strip_suffix(br).unwrap_or(s).trim_end();
        }
        if s.len() == before {
            return s;
        }
    }
}
