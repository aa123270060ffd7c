//! C6 — pure-data filtering and merging of local (graph) and applied (provider) revisions.
//!
//! These are plain functions over in-memory sequences; they hold no state and talk to neither
//! the filesystem nor a database. The coordinator (§4.5, upgrade filtering) and the CLI's
//! browse view (§4.5, combined listing) both delegate to these so behavior never drifts
//! between the two callers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::revision::{AppliedRevision, Revision, RevisionFilter};

/// Filter a disk-loaded revision sequence in place, preserving order.
pub fn filter_revisions<'a>(revisions: &[&'a Revision], filter: &RevisionFilter) -> Vec<&'a Revision> {
    revisions.iter().copied().filter(|r| filter.matches(r)).collect()
}

/// Filter an applied-history sequence, preserving order.
pub fn filter_applied(revisions: &[AppliedRevision], filter: &RevisionFilter) -> Vec<AppliedRevision> {
    revisions.iter().filter(|r| filter.matches_applied(r)).cloned().collect()
}

/// One entry in a combined browse listing: either an applied row from the provider, or a
/// not-yet-applied revision from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEntry {
    Applied(AppliedRevision),
    NotApplied(Revision),
}

impl BrowseEntry {
    pub fn revision_id(&self) -> &str {
        match self {
            Self::Applied(r) => &r.revision_id,
            Self::NotApplied(r) => &r.revision_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Applied(r) => r.created_at,
            Self::NotApplied(r) => r.created_at,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Merge `applied` (tagged "applied") with every `local` revision not present in `applied`
/// (tagged "not applied"), sorted by `created_at` descending — the coordinator's "combined
/// view" query (§4.5).
pub fn merge_combined(local: &[&Revision], applied: &[AppliedRevision]) -> Vec<BrowseEntry> {
    let applied_ids: BTreeSet<&str> = applied.iter().map(|r| r.revision_id.as_str()).collect();

    let mut out: Vec<BrowseEntry> = applied.iter().cloned().map(BrowseEntry::Applied).collect();
    out.extend(
        local
            .iter()
            .filter(|r| !applied_ids.contains(r.revision_id.as_str()))
            .map(|r| BrowseEntry::NotApplied((*r).clone())),
    );

    out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    out
}

pub fn tags_from_csv(input: &str) -> BTreeSet<String> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rev(id: &str, author: Option<&str>, tags: Option<&[&str]>) -> Revision {
        Revision {
            revision_id: id.to_string(),
            down_revision_id: None,
            message: String::new(),
            author: author.map(String::from),
            tags: tags.map(|t| t.iter().map(|s| s.to_string()).collect()),
            up_sql: None,
            down_sql: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn author_filter_excludes_absent_author() {
        let revisions = vec![rev("a", Some("ada"), None), rev("b", None, None)];
        let refs: Vec<&Revision> = revisions.iter().collect();
        let filter = RevisionFilter {
            author: Some("ada".to_string()),
            tags: None,
            since: None,
        };
        let out = filter_revisions(&refs, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].revision_id, "a");
    }

    #[test]
    fn tag_filter_requires_intersection() {
        let revisions = vec![
            rev("a", None, Some(&["feature", "backend"])),
            rev("b", None, Some(&["bugfix"])),
            rev("c", None, Some(&["feature", "frontend"])),
        ];
        let refs: Vec<&Revision> = revisions.iter().collect();
        let filter = RevisionFilter {
            author: None,
            tags: Some(tags_from_csv("feature")),
            since: None,
        };
        let out = filter_revisions(&refs, &filter);
        let ids: Vec<&str> = out.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn filter_monotonicity() {
        let revisions = vec![
            rev("a", Some("ada"), Some(&["feature"])),
            rev("b", Some("ada"), Some(&["bugfix"])),
            rev("c", Some("grace"), Some(&["feature"])),
        ];
        let refs: Vec<&Revision> = revisions.iter().collect();

        let narrow = RevisionFilter {
            author: Some("ada".to_string()),
            tags: Some(tags_from_csv("feature")),
            since: None,
        };
        let wide = RevisionFilter {
            author: Some("ada".to_string()),
            tags: None,
            since: None,
        };

        let narrow_ids: BTreeSet<&str> =
            filter_revisions(&refs, &narrow).iter().map(|r| r.revision_id.as_str()).collect();
        let wide_ids: BTreeSet<&str> =
            filter_revisions(&refs, &wide).iter().map(|r| r.revision_id.as_str()).collect();

        assert!(narrow_ids.is_subset(&wide_ids));
    }
}
