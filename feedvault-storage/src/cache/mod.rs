//! Disk cache for fetched content pages.
//!
//! Pages are stored as whole JSON documents under a sanitized file name
//! derived from the caller's cache key, and evicted least-recently-used
//! first once the directory exceeds its size budget.
//!
//! # Example
//!
//! ```ignore
//! let cache = DiskCache::new(&DiskCacheConfig::new(dir))?;
//! cache.save(&keys::feed_page(FeedKind::New, ContentFlags::SFW, 1), &items).await;
//!
//! if let Some(items) = cache.load::<FeedItem>("feed_new_flags_1_page_1").await {
//!     render(items);
//! }
//! ```

pub mod disk;
pub mod key;
pub mod traits;

pub use disk::DiskCache;
pub use key::SanitizedKey;
pub use traits::{CacheStats, MediaCache, NoMediaCache};
