//! The [`Revision`] data model — the atomic unit of schema change.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single atomic schema change.
///
/// `down_revision_id` and `up_sql`/`down_sql` are genuinely optional, so they are modeled as
/// `Option<String>` uniformly rather than overloading empty strings the way the source does in
/// places.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Revision {
    pub revision_id: String,
    pub down_revision_id: Option<String>,
    pub message: String,
    pub author: Option<String>,
    /// `None` when the `Tags` header was absent entirely; `Some(empty set)` is representable
    /// but in practice the parser only ever produces `None` or a non-empty set.
    pub tags: Option<BTreeSet<String>>,
    pub up_sql: Option<String>,
    pub down_sql: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Revision {
    /// True when this revision has no predecessor — the root of the chain.
    pub fn is_root(&self) -> bool {
        self.down_revision_id.is_none()
    }

    /// Set-intersection non-empty match against requested tags (§4.6 tag filter contract).
    ///
    /// A revision with absent/empty tags never matches a non-empty tag filter.
    pub fn matches_tags(&self, requested: &BTreeSet<String>) -> bool {
        if requested.is_empty() {
            return true;
        }
        match &self.tags {
            Some(tags) if !tags.is_empty() => tags.intersection(requested).next().is_some(),
            _ => false,
        }
    }

    /// Equality match against an author filter (§4.6 author filter contract).
    ///
    /// A revision with an absent author never matches a non-empty author filter.
    pub fn matches_author(&self, requested: &str) -> bool {
        if requested.is_empty() {
            return true;
        }
        self.author.as_deref() == Some(requested)
    }

    /// `created_at >= since` (§4.6 date filter contract).
    pub fn matches_since(&self, since: DateTime<Utc>) -> bool {
        self.created_at >= since
    }
}

/// A row in the bookkeeping table, as returned by a [`crate::provider::Provider`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AppliedRevision {
    pub revision_id: String,
    pub down_revision_id: Option<String>,
    pub message: String,
    pub author: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub created_at: DateTime<Utc>,
}

impl AppliedRevision {
    pub fn matches_tags(&self, requested: &BTreeSet<String>) -> bool {
        if requested.is_empty() {
            return true;
        }
        match &self.tags {
            Some(tags) if !tags.is_empty() => tags.intersection(requested).next().is_some(),
            _ => false,
        }
    }

    pub fn matches_author(&self, requested: &str) -> bool {
        if requested.is_empty() {
            return true;
        }
        self.author.as_deref() == Some(requested)
    }

    pub fn matches_since(&self, since: DateTime<Utc>) -> bool {
        self.created_at >= since
    }
}

impl From<&Revision> for AppliedRevision {
    fn from(r: &Revision) -> Self {
        Self {
            revision_id: r.revision_id.clone(),
            down_revision_id: r.down_revision_id.clone(),
            message: r.message.clone(),
            author: r.author.clone(),
            tags: r.tags.clone(),
            created_at: r.created_at,
        }
    }
}

/// Optional filters shared by upgrade planning (§4.5) and the browse query layer (§4.6).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RevisionFilter {
    pub author: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub since: Option<DateTime<Utc>>,
}

impl RevisionFilter {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.tags.is_none() && self.since.is_none()
    }

    pub fn matches(&self, rev: &Revision) -> bool {
        if let Some(author) = &self.author {
            if !rev.matches_author(author) {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !rev.matches_tags(tags) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if !rev.matches_since(since) {
                return false;
            }
        }
        true
    }

    pub fn matches_applied(&self, rev: &AppliedRevision) -> bool {
        if let Some(author) = &self.author {
            if !rev.matches_author(author) {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !rev.matches_tags(tags) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if !rev.matches_since(since) {
                return false;
            }
        }
        true
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn revision_round_trips_through_json() {
        let rev = Revision {
            revision_id: "abc123".to_string(),
            down_revision_id: None,
            message: "create users table".to_string(),
            author: Some("ada".to_string()),
            tags: Some(BTreeSet::from(["schema".to_string()])),
            up_sql: Some("CREATE TABLE users (id INT);".to_string()),
            down_sql: Some("DROP TABLE users;".to_string()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&rev).unwrap();
        let back: Revision = serde_json::from_str(&json).unwrap();
        assert_eq!(rev, back);
    }
}
