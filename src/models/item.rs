//! Content item data structure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The person who wrote a content item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    /// Source-side author identifier (empty when the source has none)
    pub id: String,

    /// Display name
    pub name: String,

    /// Avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// A normalized unit of content from any source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentItem {
    /// Parent group (news post id for comments, entry id for feed entries)
    pub group_key: String,

    /// Strictly increasing ordinal within the group.
    ///
    /// Comment-style items always carry one. Feed entries are their own
    /// group and have none; a content hash stands in for their version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<u64>,

    /// Title of the group this item belongs to
    pub title: String,

    pub author: Author,

    /// Source-reported creation time
    pub timestamp: DateTime<Utc>,

    /// Raw HTML body
    pub body: String,

    /// Permalink
    pub url: String,
}

impl ContentItem {
    /// Age of the item relative to `now`. Items from the future have zero age.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }

    /// Canonical URL of the item's group: the permalink without its fragment.
    pub fn group_url(&self) -> &str {
        self.url.split('#').next().unwrap_or(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item(timestamp: DateTime<Utc>) -> ContentItem {
        ContentItem {
            group_key: "1702811255219116398".to_string(),
            item_id: Some(5),
            title: "Patch notes".to_string(),
            author: Author::new("257266967", "leafy").with_avatar("https://example.com/a.jpg"),
            timestamp,
            body: "hello".to_string(),
            url: "https://example.com/detail/1#comment_5".to_string(),
        }
    }

    #[test]
    fn test_age() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let item = sample_item(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        assert_eq!(item.age(now), Duration::days(1));
    }

    #[test]
    fn test_group_url() {
        let item = sample_item(Utc::now());
        assert_eq!(item.group_url(), "https://example.com/detail/1");

        let mut entry = sample_item(Utc::now());
        entry.url = "https://example.com/posts/7".to_string();
        assert_eq!(entry.group_url(), "https://example.com/posts/7");
    }

    #[test]
    fn test_future_item_has_zero_age() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let item = sample_item(now + Duration::minutes(5));
        assert_eq!(item.age(now), Duration::zero());
    }
}
