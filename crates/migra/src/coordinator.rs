//! C5 — the migration coordinator: reconciles the graph (C4) against the database's recorded
//! head revision (C3), plans an up/down path honouring step and filter constraints, validates
//! path continuity, and drives the provider transactionally.
//!
//! The coordinator is the only component that holds references to both the graph and the
//! provider (§3 "Ownership"); neither shares mutable state with the other.

use std::path::{Path, PathBuf};

use crate::error::{MigraError, MigraResult};
use crate::filename;
use crate::filter::{self, BrowseEntry};
use crate::graph::MigrationGraph;
use crate::parser;
use crate::provider::Provider;
use crate::revision::{AppliedRevision, Revision, RevisionFilter};

/// Drives upgrade/downgrade plans against a loaded graph and a connected provider.
pub struct Coordinator {
    graph: MigrationGraph,
    provider: Box<dyn Provider>,
}

impl Coordinator {
    pub fn new(graph: MigrationGraph, provider: Box<dyn Provider>) -> Self {
        Self { graph, provider }
    }

    pub fn graph(&self) -> &MigrationGraph {
        &self.graph
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Computes the upgrade plan without applying it: the candidate sequence after `head`,
    /// filtered and continuity-checked, truncated to `steps`. Exposed so a CLI `--dry-run` can
    /// show exactly what [`Coordinator::upgrade`] would do.
    ///
    /// 1. Ensures the bookkeeping table exists.
    /// 2. Reads `head` from the provider.
    /// 3. Computes the candidate sequence (`iter()` if head is absent, else `iter_from(head)`).
    /// 4. Applies filter predicates; if any filter is active, validates the filtered sequence is
    ///    a contiguous chain rooted at head.
    /// 5. Truncates to at most `steps` entries.
    pub async fn plan_upgrade(
        &self,
        filter: &RevisionFilter,
        steps: Option<usize>,
    ) -> MigraResult<Vec<&Revision>> {
        self.provider.create_bookkeeping().await?;
        let head = self.provider.get_head().await?;

        let candidates: Vec<&Revision> = match &head {
            Some(h) => self.graph.iter_from(&h.revision_id)?,
            None => self.graph.iter()?,
        };

        let mut planned: Vec<&Revision> = if filter.is_empty() {
            candidates
        } else {
            let filtered = filter::filter_revisions(&candidates, filter);
            continuity_check(&filtered, head.as_ref())?;
            filtered
        };

        if let Some(n) = steps {
            planned.truncate(n);
        }

        Ok(planned)
    }

    /// Plan and execute an upgrade. Returns the revision ids applied, in order. Halts on the
    /// first error; already-applied revisions remain applied (§4.5).
    #[tracing::instrument(skip(self, filter))]
    pub async fn upgrade(
        &self,
        filter: &RevisionFilter,
        steps: Option<usize>,
    ) -> MigraResult<Vec<String>> {
        let planned = self.plan_upgrade(filter, steps).await?;

        let mut applied = Vec::with_capacity(planned.len());
        for revision in planned {
            self.provider.apply_up(revision).await?;
            tracing::info!(revision_id = %revision.revision_id, "applied up migration");
            applied.push(revision.revision_id.clone());
        }
        Ok(applied)
    }

    /// Computes the downgrade plan without applying it: the chain of revisions that would be
    /// rolled back, in order, starting from head. Exposed so a CLI `--dry-run` can show exactly
    /// what [`Coordinator::downgrade`] would do.
    pub async fn plan_downgrade(&self, steps: Option<usize>) -> MigraResult<Vec<&Revision>> {
        let Some(head) = self.provider.get_head().await? else {
            return Ok(Vec::new());
        };

        let mut current = self.graph.get(&head.revision_id).ok_or_else(|| {
            MigraError::plan(format!(
                "head revision '{}' recorded in the database is not present on disk",
                head.revision_id
            ))
        })?;

        let mut planned = Vec::new();
        loop {
            planned.push(current);

            if let Some(n) = steps {
                if planned.len() >= n {
                    break;
                }
            }

            match &current.down_revision_id {
                None => break,
                Some(prev_id) => {
                    current = self.graph.get(prev_id).ok_or_else(|| {
                        MigraError::plan(format!(
                            "revision '{prev_id}' referenced by '{}' is not present on disk",
                            current.revision_id
                        ))
                    })?;
                }
            }
        }
        Ok(planned)
    }

    /// Plan and execute a downgrade. Returns the revision ids rolled back, in order.
    ///
    /// No-op when no head is recorded. Otherwise walks backward from head via
    /// `down_revision_id`, applying one `apply_down` per step, stopping at `steps` (if given)
    /// or when the root is reached.
    #[tracing::instrument(skip(self))]
    pub async fn downgrade(&self, steps: Option<usize>) -> MigraResult<Vec<String>> {
        let planned = self.plan_downgrade(steps).await?;

        let mut rolled_back = Vec::with_capacity(planned.len());
        for revision in planned {
            self.provider.apply_down(revision).await?;
            tracing::info!(revision_id = %revision.revision_id, "applied down migration");
            rolled_back.push(revision.revision_id.clone());
        }
        Ok(rolled_back)
    }

    /// The "combined view" query: merges applied revisions (from the provider) with
    /// not-yet-applied revisions (from the graph), both filtered by the same predicates,
    /// sorted by `created_at` descending.
    pub async fn combined_view(&self, filter: &RevisionFilter) -> MigraResult<Vec<BrowseEntry>> {
        let applied: Vec<AppliedRevision> = self.provider.list(filter).await?;
        let local = self.graph.iter()?;
        let local_filtered = filter::filter_revisions(&local, filter);
        Ok(filter::merge_combined(&local_filtered, &applied))
    }

    /// Renders a filename (C2) and body (C1) for `revision` and writes it into `dir`.
    ///
    /// The coordinator does not verify that `revision.down_revision_id` matches the current
    /// chain leaf — the caller is responsible; the next [`MigrationGraph::build`] surfaces any
    /// inconsistency as a divergence or orphan error.
    pub fn save_revision(dir: &Path, file_format: &str, revision: &Revision) -> MigraResult<PathBuf> {
        let filename = filename::render_filename(file_format, revision)?;
        let path = dir.join(filename);
        let body = parser::render_body(revision);
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

/// Verifies a filtered upgrade sequence is a contiguous chain rooted at `head` (§4.5).
fn continuity_check(filtered: &[&Revision], head: Option<&AppliedRevision>) -> MigraResult<()> {
    let Some((first, rest)) = filtered.split_first() else {
        return Ok(());
    };

    let expected_first = head.map(|h| h.revision_id.as_str());
    if first.down_revision_id.as_deref() != expected_first {
        return Err(MigraError::plan(format!(
            "revision '{}' is not contiguous with head: expected down_revision_id {expected_first:?}, found {:?}",
            first.revision_id, first.down_revision_id
        )));
    }

    let mut previous = *first;
    for revision in rest {
        if revision.down_revision_id.as_deref() != Some(previous.revision_id.as_str()) {
            return Err(MigraError::plan(format!(
                "revision '{}' is missing its dependency '{}', which was filtered out of the sequence",
                revision.revision_id,
                revision.down_revision_id.as_deref().unwrap_or("none")
            )));
        }
        previous = revision;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn rev(id: &str, down: Option<&str>, author: Option<&str>) -> Revision {
        Revision {
            revision_id: id.to_string(),
            down_revision_id: down.map(String::from),
            message: String::new(),
            author: author.map(String::from),
            tags: None,
            up_sql: Some(format!("-- up {id}")),
            down_sql: Some(format!("-- down {id}")),
            created_at: Utc::now(),
        }
    }

    /// An in-memory provider for exercising the coordinator without a real database.
    struct FakeProvider {
        applied: Mutex<Vec<AppliedRevision>>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self { applied: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn create_bookkeeping(&self) -> MigraResult<()> {
            Ok(())
        }

        async fn drop_bookkeeping(&self) -> MigraResult<()> {
            self.applied.lock().unwrap().clear();
            Ok(())
        }

        async fn get_head(&self) -> MigraResult<Option<AppliedRevision>> {
            Ok(self.applied.lock().unwrap().last().cloned())
        }

        async fn apply_up(&self, rev: &Revision) -> MigraResult<u64> {
            self.applied.lock().unwrap().push(AppliedRevision::from(rev));
            Ok(1)
        }

        async fn apply_down(&self, rev: &Revision) -> MigraResult<u64> {
            let mut applied = self.applied.lock().unwrap();
            let before = applied.len();
            applied.retain(|r| r.revision_id != rev.revision_id);
            Ok((before - applied.len()) as u64)
        }

        async fn list(&self, filter: &RevisionFilter) -> MigraResult<Vec<AppliedRevision>> {
            let mut out: Vec<AppliedRevision> =
                self.applied.lock().unwrap().iter().filter(|r| filter.matches_applied(r)).cloned().collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }
    }

    fn coordinator() -> Coordinator {
        let graph = MigrationGraph::from_revisions(vec![
            rev("r1", None, Some("ada")),
            rev("r2", Some("r1"), Some("grace")),
            rev("r3", Some("r2"), Some("ada")),
        ]);
        Coordinator::new(graph, Box::new(FakeProvider::new()))
    }

    #[tokio::test]
    async fn first_upgrade_applies_the_whole_chain() {
        let c = coordinator();
        let applied = c.upgrade(&RevisionFilter::default(), None).await.unwrap();
        assert_eq!(applied, vec!["r1", "r2", "r3"]);
        assert_eq!(c.provider().get_head().await.unwrap().unwrap().revision_id, "r3");
    }

    #[tokio::test]
    async fn stepwise_upgrade_then_downgrade() {
        let c = coordinator();
        let applied = c.upgrade(&RevisionFilter::default(), Some(2)).await.unwrap();
        assert_eq!(applied, vec!["r1", "r2"]);
        assert_eq!(c.provider().get_head().await.unwrap().unwrap().revision_id, "r2");

        let applied = c.upgrade(&RevisionFilter::default(), Some(1)).await.unwrap();
        assert_eq!(applied, vec!["r3"]);
        assert_eq!(c.provider().get_head().await.unwrap().unwrap().revision_id, "r3");

        let down = c.downgrade(Some(1)).await.unwrap();
        assert_eq!(down, vec!["r3"]);
        assert_eq!(c.provider().get_head().await.unwrap().unwrap().revision_id, "r2");

        let down = c.downgrade(Some(1)).await.unwrap();
        assert_eq!(down, vec!["r2"]);
        assert_eq!(c.provider().get_head().await.unwrap().unwrap().revision_id, "r1");

        let down = c.downgrade(Some(1)).await.unwrap();
        assert_eq!(down, vec!["r1"]);
        assert!(c.provider().get_head().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_trip_leaves_no_head() {
        let c = coordinator();
        c.upgrade(&RevisionFilter::default(), None).await.unwrap();
        let down = c.downgrade(None).await.unwrap();
        assert_eq!(down, vec!["r3", "r2", "r1"]);
        assert!(c.provider().get_head().await.unwrap().is_none());
        assert!(c.provider().list(&RevisionFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filtered_upgrade_with_gap_is_rejected() {
        let c = coordinator();
        let filter = RevisionFilter {
            author: Some("ada".to_string()),
            tags: None,
            since: None,
        };
        let err = c.upgrade(&filter, None).await.unwrap_err();
        match err {
            MigraError::Plan(msg) => {
                assert!(msg.contains("r3"));
                assert!(msg.contains("r2"));
            }
            other => panic!("expected PlanError, got {other:?}"),
        }
        // Nothing committed: the continuity check runs before any apply_up.
        assert!(c.provider().get_head().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn downgrade_on_empty_head_is_noop() {
        let c = coordinator();
        let down = c.downgrade(None).await.unwrap();
        assert!(down.is_empty());
    }

    #[tokio::test]
    async fn combined_view_tags_applied_and_not_applied() {
        let c = coordinator();
        c.upgrade(&RevisionFilter::default(), Some(1)).await.unwrap();

        let entries = c.combined_view(&RevisionFilter::default()).await.unwrap();
        let applied_ids: BTreeSet<&str> =
            entries.iter().filter(|e| e.is_applied()).map(|e| e.revision_id()).collect();
        let pending_ids: BTreeSet<&str> =
            entries.iter().filter(|e| !e.is_applied()).map(|e| e.revision_id()).collect();

        assert_eq!(applied_ids, BTreeSet::from(["r1"]));
        assert_eq!(pending_ids, BTreeSet::from(["r2", "r3"]));
    }
}
