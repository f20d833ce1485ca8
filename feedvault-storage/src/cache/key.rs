//! Cache key sanitization for on-disk entries.
//!
//! A `SanitizedKey` can only be obtained through [`SanitizedKey::new`], so every
//! path the disk cache touches has passed validation.

use std::path::{Path, PathBuf};

use feedvault_core::{CacheError, CacheResult};

/// Extension of committed cache entries.
pub const ENTRY_EXTENSION: &str = "json";

/// Extension of in-progress writes. Anything with this suffix is an orphan
/// once the cache is reopened.
pub const TEMP_EXTENSION: &str = "json.tmp";

/// The file identity of a cache key.
///
/// # Format
///
/// Every character that is not ASCII alphanumeric is replaced by `_`, so
/// `"favorites_alice/collection 42"` becomes `"favorites_alice_collection_42"`.
///
/// Distinct keys can collapse to the same identity (`"a-b"` and `"a.b"`).
/// Producers build keys that are already filesystem-safe, so the collision
/// is tolerated rather than encoded away.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SanitizedKey {
    inner: String,
}

impl SanitizedKey {
    /// Sanitize a caller key.
    ///
    /// Rejects keys that are empty or that contain no alphanumeric character,
    /// since their identity would carry no information.
    pub fn new(key: &str) -> CacheResult<Self> {
        let inner = sanitize(key);
        if inner.is_empty() {
            return Err(CacheError::InvalidKey {
                key: key.to_string(),
                reason: "key is empty".to_string(),
            });
        }
        if !inner.bytes().any(|b| b.is_ascii_alphanumeric()) {
            return Err(CacheError::InvalidKey {
                key: key.to_string(),
                reason: "key has no alphanumeric characters".to_string(),
            });
        }
        Ok(Self { inner })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Path of the committed entry inside `directory`.
    pub fn entry_path(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}.{}", self.inner, ENTRY_EXTENSION))
    }

    /// Path of the in-progress write inside `directory`.
    pub fn temp_path(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}.{}", self.inner, TEMP_EXTENSION))
    }
}

/// Replace every non-alphanumeric character with `_`.
pub fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Recover the sanitized identity from a committed entry file name.
///
/// Returns `None` for temp files and anything the cache does not manage.
pub fn entry_name(file_name: &str) -> Option<&str> {
    if file_name.ends_with(TEMP_EXTENSION) {
        return None;
    }
    let stem = file_name.strip_suffix(ENTRY_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}
