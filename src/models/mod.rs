// src/models/mod.rs

//! Domain models for the tracker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod item;
mod marker;
mod notification;

// Re-export all public types
pub use config::{
    CommentsConfig, Config, DeliveryConfig, FeedConfig, HttpConfig, LoggingConfig,
    MIN_TRUNCATE_LENGTH, WebhookConfig,
};
pub use item::{Author, ContentItem};
pub use marker::{HASH_LEN, Marker, content_hash};
pub use notification::{Category, Notification};
