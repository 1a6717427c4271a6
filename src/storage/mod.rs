//! Watermark persistence.
//!
//! A watermark store remembers, per destination and content group, the
//! marker of the last successful delivery. Reads and writes are in memory;
//! only [`WatermarkStore::persist`] touches durable storage.
//!
//! ## File Layout
//!
//! ```text
//! {
//!   "<webhook url>": {
//!     "<group key>": "<marker>",
//!     ...
//!   },
//!   ...
//! }
//! ```

pub mod local;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Marker;

// Re-export for convenience
pub use local::JsonFileStore;

/// destination -> group -> marker
pub type Ledger = BTreeMap<String, BTreeMap<String, Marker>>;

/// Trait for watermark storage backends.
///
/// Single writer: callers must not share one backing file between
/// concurrently running engines.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Stored marker for a (destination, group) pair.
    fn get(&self, destination: &str, group_key: &str) -> Option<Marker>;

    /// Record a marker in memory. Not durable until [`persist`](Self::persist).
    fn put(&mut self, destination: &str, group_key: &str, marker: Marker);

    /// Write the full in-memory mapping to durable storage.
    async fn persist(&self) -> Result<()>;

    /// Snapshot of everything currently held.
    fn ledger(&self) -> &Ledger;
}
