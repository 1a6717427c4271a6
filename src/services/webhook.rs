//! Discord-compatible webhook notifier.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Notification, WebhookConfig};
use crate::services::Notifier;
use crate::utils::redact_webhook;

/// Embed limits enforced by the receiving side.
const TITLE_LIMIT: usize = 256;
const AUTHOR_NAME_LIMIT: usize = 256;

#[derive(Debug, Serialize)]
struct Payload<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: String,
    url: &'a str,
    description: &'a str,
    timestamp: String,
    color: u32,
    author: EmbedAuthor<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor<'a> {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

/// Posts one embed per notification to a webhook URL.
pub struct DiscordWebhook {
    client: Client,
    username: String,
    avatar_url: Option<String>,
}

impl DiscordWebhook {
    pub fn new(client: Client, config: &WebhookConfig) -> Self {
        Self {
            client,
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
        }
    }

    fn payload<'a>(&'a self, message: &'a Notification) -> Payload<'a> {
        Payload {
            username: &self.username,
            avatar_url: self.avatar_url.as_deref(),
            embeds: [Embed {
                title: clip(&message.title, TITLE_LIMIT),
                url: &message.link,
                description: &message.body,
                timestamp: message.timestamp.to_rfc3339(),
                color: message.category.color(),
                author: EmbedAuthor {
                    name: clip(&message.author_name, AUTHOR_NAME_LIMIT),
                    icon_url: message.author_avatar.as_deref(),
                },
            }],
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn deliver(&self, destination: &str, message: &Notification) -> Result<()> {
        let redacted = redact_webhook(destination);
        let url = Url::parse(destination).map_err(|e| AppError::delivery_failed(&redacted, e))?;

        // Request errors must not carry the URL: its last segment is the token
        let response = self
            .client
            .post(url)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| AppError::delivery_failed(&redacted, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::delivery_failed(
                &redacted,
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        log::debug!("Webhook {} accepted {}", redacted, message.link);
        Ok(())
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
