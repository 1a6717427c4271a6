//! Relay pipeline.
//!
//! - `run_comments`: Relay comment threads under the newest announcements
//! - `run_feed`: Relay RSS/Atom feed entries and their edits

pub mod engine;
pub mod format;
pub mod observer;
pub mod policy;
pub mod rate_limit;
pub mod relay;

pub use engine::{DeliveryEngine, EngineSettings, RelayOutcome};
pub use format::{Formatter, MarkdownFormatter, html_to_markdown, truncate};
pub use observer::{DeliveryObserver, LogObserver};
pub use policy::{DeliveryKind, DeliveryPolicy, SkipReason, Verdict};
pub use rate_limit::RateLimiter;
pub use relay::{AppThreads, relay_comments, relay_feeds, run_comments, run_feed};
