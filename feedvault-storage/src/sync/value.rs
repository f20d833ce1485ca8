//! Mergeable values kept in sync across devices.

use std::collections::BTreeSet;
use std::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// How a store reconciles its value with one observed on the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep everything from both sides.
    Union,
    /// The remote value replaces the local one.
    Replace,
}

/// Outcome of reconciling the current value with an incoming remote value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation<T> {
    /// Nothing changed; observers are not notified.
    Unchanged,
    /// Adopt the contained value.
    Adopt(T),
}

/// A value a [`SyncedStateStore`](super::SyncedStateStore) can hold.
///
/// The JSON encoding of the value is what is stored both locally and remotely.
pub trait SyncedValue:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The value before anything was stored.
    fn empty() -> Self;

    fn merge_policy() -> MergePolicy;

    /// Reconcile `self` with a value read from the remote store.
    fn reconcile(&self, incoming: Self) -> Reconciliation<Self>;

    fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

// ============================================================================
// SEEN ITEMS
// ============================================================================

/// Ids of items the user has already viewed.
///
/// Only grows during normal use; there is no way to "un-see" an item short
/// of resetting the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenItems(BTreeSet<i64>);

impl SeenItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    /// Mark one item seen. Returns true if it was not seen before.
    pub fn insert(&mut self, id: i64) -> bool {
        self.0.insert(id)
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.0.extend(ids);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &SeenItems) -> SeenItems {
        SeenItems(self.0.union(&other.0).copied().collect())
    }
}

impl FromIterator<i64> for SeenItems {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        SeenItems(iter.into_iter().collect())
    }
}

impl SyncedValue for SeenItems {
    fn empty() -> Self {
        Self::default()
    }

    fn merge_policy() -> MergePolicy {
        MergePolicy::Union
    }

    fn reconcile(&self, incoming: Self) -> Reconciliation<Self> {
        let merged = self.union(&incoming);
        // The union always contains self, so equal size means equal sets.
        if merged.len() == self.len() {
            Reconciliation::Unchanged
        } else {
            Reconciliation::Adopt(merged)
        }
    }
}

// ============================================================================
// EXCLUDED TAGS
// ============================================================================

/// A tag whose items are hidden from feeds while `enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedTag {
    pub tag: String,
    pub enabled: bool,
}

impl ExcludedTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            enabled: true,
        }
    }
}

/// User-ordered list of excluded tags.
///
/// Tags compare case-insensitively; display keeps the spelling used when
/// the tag was added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcludedTags(Vec<ExcludedTag>);

impl ExcludedTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> &[ExcludedTag] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn position(&self, tag: &str) -> Option<usize> {
        let tag = tag.trim();
        self.0.iter().position(|t| t.tag.eq_ignore_ascii_case(tag))
    }

    /// Append an enabled tag. Returns false if it is blank or already listed.
    pub fn add(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.position(tag).is_some() {
            return false;
        }
        self.0.push(ExcludedTag::new(tag));
        true
    }

    /// Remove a tag. Returns true if it was listed.
    pub fn remove(&mut self, tag: &str) -> bool {
        match self.position(tag) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    /// Enable or disable a listed tag. Returns false if it is not listed.
    pub fn set_enabled(&mut self, tag: &str, enabled: bool) -> bool {
        match self.position(tag) {
            Some(index) => {
                self.0[index].enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Flip a listed tag. Returns the new state, or `None` if not listed.
    pub fn toggle(&mut self, tag: &str) -> Option<bool> {
        let index = self.position(tag)?;
        let entry = &mut self.0[index];
        entry.enabled = !entry.enabled;
        Some(entry.enabled)
    }

    /// Whether items carrying `tag` should be hidden.
    pub fn is_excluded(&self, tag: &str) -> bool {
        self.position(tag).is_some_and(|index| self.0[index].enabled)
    }

    /// Enabled tags in list order.
    pub fn active(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().filter(|t| t.enabled).map(|t| t.tag.as_str())
    }
}

impl FromIterator<ExcludedTag> for ExcludedTags {
    fn from_iter<I: IntoIterator<Item = ExcludedTag>>(iter: I) -> Self {
        ExcludedTags(iter.into_iter().collect())
    }
}

impl SyncedValue for ExcludedTags {
    fn empty() -> Self {
        Self::default()
    }

    fn merge_policy() -> MergePolicy {
        MergePolicy::Replace
    }

    fn reconcile(&self, incoming: Self) -> Reconciliation<Self> {
        if incoming == *self {
            Reconciliation::Unchanged
        } else {
            Reconciliation::Adopt(incoming)
        }
    }
}
