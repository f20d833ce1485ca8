//! Canonical cache keys used by the client.
//!
//! Keys are plain strings built from a family prefix and the request
//! parameters, so whole families (all feed pages, all favorites) can be
//! cleared by prefix.

use std::fmt;

use crate::record::ContentFlags;

pub const FEED_PREFIX: &str = "feed_";
pub const FAVORITES_PREFIX: &str = "favorites_";
pub const UPLOADS_PREFIX: &str = "uploads_";
pub const SEARCH_PREFIX: &str = "search_";

/// Which public feed a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    New,
    Promoted,
    Junk,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedKind::New => "new",
            FeedKind::Promoted => "promoted",
            FeedKind::Junk => "junk",
        };
        f.write_str(name)
    }
}

/// Key for one page of a public feed, e.g. `feed_new_flags_1_page_3`.
pub fn feed_page(feed: FeedKind, flags: ContentFlags, page: u32) -> String {
    format!("{FEED_PREFIX}{feed}_flags_{}_page_{page}", flags.bits())
}

/// Key for one favorites collection of a user.
pub fn favorites(user: &str, collection_id: i64) -> String {
    format!("{FAVORITES_PREFIX}{user}_collection_{collection_id}")
}

/// Key for the uploads of a user under a content filter.
pub fn user_uploads(user: &str, flags: ContentFlags) -> String {
    format!("{UPLOADS_PREFIX}{user}_flags_{}", flags.bits())
}

/// Key for a tag search. Tags are joined with `+` before sanitization.
pub fn search(tags: &[&str], flags: ContentFlags) -> String {
    format!("{SEARCH_PREFIX}{}_flags_{}", tags.join("+"), flags.bits())
}
