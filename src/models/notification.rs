//! Outbound notification message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category tag carried by a notification, rendered as an embed color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Comment,
    NewEntry,
    UpdatedEntry,
}

impl Category {
    /// RGB color for the category.
    pub fn color(self) -> u32 {
        match self {
            Category::Comment => 0x3498db,
            Category::NewEntry => 0x2ecc71,
            Category::UpdatedEntry => 0xe67e22,
        }
    }
}

/// A prepared message, ready for a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub link: String,
    pub timestamp: DateTime<Utc>,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar: Option<String>,
    pub category: Category,
}
