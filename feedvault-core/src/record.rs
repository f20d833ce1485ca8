//! Content records that can be stored in the disk cache.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Marker trait for records that can be cached.
///
/// The disk cache stores ordered sequences of records as JSON and never
/// inspects them beyond their identity.
///
/// # Implementation Requirements
///
/// - `record_id()` must be stable across fetches of the same upstream item
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned` for cache storage
/// - Implementations must be `Send + Sync + 'static` for async compatibility
pub trait CacheableRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Get the stable identity of this record.
    fn record_id(&self) -> i64;
}

// ============================================================================
// CONTENT FLAGS
// ============================================================================

bitflags! {
    /// Content rating filter applied to a feed request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContentFlags: u8 {
        /// Safe for work
        const SFW = 0b0000_0001;
        /// Not safe for work
        const NSFW = 0b0000_0010;
        /// Not safe for life
        const NSFL = 0b0000_0100;
        /// Not safe for public
        const NSFP = 0b0000_1000;
        /// Political content
        const POL = 0b0001_0000;
    }
}

impl Default for ContentFlags {
    fn default() -> Self {
        Self::SFW
    }
}

// The upstream API transmits flags as a plain integer.
impl Serialize for ContentFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid ContentFlags bits: {:#04x}", bits))
        })
    }
}

// ============================================================================
// FEED ITEM
// ============================================================================

/// One upload as returned by the feed endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: i64,
    /// Position in the promoted feed, 0 when not promoted.
    pub promoted: i64,
    pub user: String,
    pub image: String,
    pub thumb: String,
    pub fullsize: Option<String>,
    pub width: u32,
    pub height: u32,
    pub audio: bool,
    pub flags: ContentFlags,
    pub up: i32,
    pub down: i32,
    pub created: DateTime<Utc>,
}

impl FeedItem {
    /// Whether the media is a video container.
    pub fn is_video(&self) -> bool {
        self.image.ends_with(".mp4") || self.image.ends_with(".webm")
    }

    /// Net vote score.
    pub fn score(&self) -> i32 {
        self.up - self.down
    }
}

impl CacheableRecord for FeedItem {
    fn record_id(&self) -> i64 {
        self.id
    }
}
