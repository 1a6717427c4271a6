//! Watermark markers.
//!
//! A marker is the stored "last delivered" pointer for a
//! (destination, group) pair. Comment groups store the largest ordinal
//! delivered; feed entries store the digest of the last delivered body.
//!
//! Markers serialize as strings: ordinals as decimal text, hashes as
//! 64 lowercase hex characters. Bare JSON integers are accepted on read.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Marker {
    Ordinal(u64),
    Hash(String),
}

impl Marker {
    /// Hash marker for a piece of formatted text.
    pub fn digest(text: &str) -> Self {
        Self::Hash(content_hash(text))
    }

    pub fn as_ordinal(&self) -> Option<u64> {
        match self {
            Self::Ordinal(n) => Some(*n),
            Self::Hash(_) => None,
        }
    }

    pub fn as_hash(&self) -> Option<&str> {
        match self {
            Self::Hash(h) => Some(h),
            Self::Ordinal(_) => None,
        }
    }

    /// Parse the string form written by [`Marker`]'s `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == HASH_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Some(Self::Hash(s.to_ascii_lowercase()));
        }
        s.parse().ok().map(Self::Ordinal)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(n) => write!(f, "{n}"),
            Self::Hash(h) => f.write_str(h),
        }
    }
}

/// SHA-256 of `text`, hex encoded.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl Serialize for Marker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Marker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MarkerVisitor)
    }
}

struct MarkerVisitor;

impl Visitor<'_> for MarkerVisitor {
    type Value = Marker;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal ordinal or a hex digest")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Marker, E> {
        Ok(Marker::Ordinal(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Marker, E> {
        u64::try_from(v)
            .map(Marker::Ordinal)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Marker, E> {
        Marker::parse(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}
