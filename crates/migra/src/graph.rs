//! C4 — the migration graph: loads all scripts in a directory, validates their shape, and
//! exposes ordered traversal.
//!
//! The graph is immutable after [`MigrationGraph::build`]. Nodes live in a
//! `HashMap<revision_id, Revision>`; a second `HashMap<down_revision_id, revision_id>` is the
//! forward-edge index, mirroring the source's `down_revision -> revision` edge direction.
//! Validation (cycle/divergence checks) runs on demand rather than at build time, so tests can
//! construct graphs directly from hand-built revision sets.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{MigraError, MigraResult};
use crate::parser;
use crate::revision::Revision;

#[derive(Debug, Clone, Default)]
pub struct MigrationGraph {
    nodes: HashMap<String, Revision>,
    /// down_revision_id -> revision_id (forward edges, root keyed by `None`).
    edges: HashMap<Option<String>, Vec<String>>,
}

impl MigrationGraph {
    /// Enumerate all regular files in `dir`, parse each into a [`Revision`], and assemble the
    /// graph. Non-`.sql` files and subdirectories are fatal.
    pub fn build(dir: impl AsRef<Path>) -> MigraResult<Self> {
        let dir = dir.as_ref();
        let mut nodes = HashMap::new();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            MigraError::invalid_file(dir.display().to_string(), format!("cannot read directory: {e}"))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                MigraError::invalid_file(dir.display().to_string(), format!("cannot read entry: {e}"))
            })?;
            let path = entry.path();

            if path.is_dir() {
                return Err(MigraError::invalid_file(
                    path.display().to_string(),
                    "subdirectories are not allowed in the migration directory",
                ));
            }
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                return Err(MigraError::invalid_file(
                    path.display().to_string(),
                    "migration file must be a .sql file",
                ));
            }

            let revision = parser::parse_file(&path)?;
            if nodes.contains_key(&revision.revision_id) {
                return Err(MigraError::invalid_file(
                    path.display().to_string(),
                    format!("duplicate revision_id '{}'", revision.revision_id),
                ));
            }
            nodes.insert(revision.revision_id.clone(), revision);
        }

        Ok(Self::from_nodes(nodes))
    }

    /// Construct a graph directly from an already-parsed revision set — the seam the testable
    /// properties in SPEC_FULL.md §8 rely on.
    pub fn from_revisions(revisions: impl IntoIterator<Item = Revision>) -> Self {
        let nodes = revisions.into_iter().map(|r| (r.revision_id.clone(), r)).collect();
        Self::from_nodes(nodes)
    }

    fn from_nodes(nodes: HashMap<String, Revision>) -> Self {
        let mut edges: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for revision in nodes.values() {
            edges
                .entry(revision.down_revision_id.clone())
                .or_default()
                .push(revision.revision_id.clone());
        }
        Self { nodes, edges }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, revision_id: &str) -> Option<&Revision> {
        self.nodes.get(revision_id)
    }

    /// The unique revision with no predecessor; absent on an empty graph.
    pub fn root(&self) -> Option<&Revision> {
        let roots = self.edges.get(&None)?;
        roots.first().and_then(|id| self.nodes.get(id))
    }

    /// Raise [`MigraError::MultipleRoots`] if more than one revision has no predecessor
    /// (§3 invariant 2: exactly one root).
    pub fn check_single_root(&self) -> MigraResult<()> {
        if let Some(roots) = self.edges.get(&None) {
            if roots.len() > 1 {
                let mut roots = roots.clone();
                roots.sort();
                return Err(MigraError::MultipleRoots(roots));
            }
        }
        Ok(())
    }

    /// Raise [`MigraError::CycleDetected`] if the induced directed graph contains a cycle.
    ///
    /// Every node has at most one predecessor (`down_revision_id` is a single field), so
    /// walking *backward* from any node is a deterministic linked-list-style walk: a cycle
    /// exists iff that walk revisits a node still on the current path before reaching a root
    /// (`down_revision_id = None`) or a node already known to terminate cleanly.
    pub fn check_cycles(&self) -> MigraResult<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum State {
            InProgress,
            Resolved,
        }
        let mut state: HashMap<String, State> = HashMap::new();

        for start in self.nodes.keys() {
            if state.get(start) == Some(&State::Resolved) {
                continue;
            }

            let mut path = Vec::new();
            let mut current = Some(start.clone());
            while let Some(id) = current {
                match state.get(&id) {
                    Some(State::Resolved) => break,
                    Some(State::InProgress) => {
                        return Err(self.cycle_error_ending_at(&path, &id));
                    }
                    None => {
                        state.insert(id.clone(), State::InProgress);
                        path.push(id.clone());
                        current = self.nodes.get(&id).and_then(|r| r.down_revision_id.clone());
                    }
                }
            }
            for id in path {
                state.insert(id, State::Resolved);
            }
        }

        Ok(())
    }

    /// `path[i]`'s predecessor is `path[i+1]` (we walked backward via `down_revision_id`), so
    /// the forward (predecessor -> successor) edge for each consecutive pair is `path[i+1] ->
    /// path[i]`; the closing edge is `repeat -> path.last()`.
    fn cycle_error_ending_at(&self, path: &[String], repeat: &str) -> MigraError {
        let start = path.iter().position(|id| id == repeat).unwrap_or(0);
        let segment = &path[start..];
        let mut edges: Vec<(String, String)> = segment
            .windows(2)
            .map(|w| (w[1].clone(), w[0].clone()))
            .collect();
        if let Some(last) = segment.last() {
            edges.push((repeat.to_string(), last.clone()));
        }
        MigraError::CycleDetected(edges)
    }

    /// Raise [`MigraError::DivergentBranch`] if any node has out-degree > 1.
    pub fn check_divergence(&self) -> MigraResult<()> {
        // Multiple roots (two nodes with down_revision_id = None) are not a divergent branch —
        // the source never registers an edge for a root, so only real predecessor nodes are
        // checked for out-degree here.
        for (down_revision_id, successors) in &self.edges {
            let Some(node) = down_revision_id else { continue };
            if successors.len() > 1 {
                let mut successors = successors.clone();
                successors.sort();
                return Err(MigraError::DivergentBranch { node: node.clone(), successors });
            }
        }
        Ok(())
    }

    fn successor_of(&self, revision_id: &str) -> Option<String> {
        self.edges.get(&Some(revision_id.to_string())).and_then(|v| v.first()).cloned()
    }

    /// The unique revision with no successor; absent on an empty graph. Runs the cycle and
    /// divergence checks first.
    pub fn last(&self) -> MigraResult<Option<&Revision>> {
        self.check_cycles()?;
        self.check_divergence()?;
        self.check_single_root()?;

        if self.nodes.is_empty() {
            return Ok(None);
        }
        for id in self.nodes.keys() {
            if self.successor_of(id).is_none() {
                return Ok(self.nodes.get(id));
            }
        }
        Ok(None)
    }

    /// Yields revisions from root to last in chain order.
    pub fn iter(&self) -> MigraResult<Vec<&Revision>> {
        self.check_cycles()?;
        self.check_divergence()?;
        self.check_single_root()?;

        let mut out = Vec::with_capacity(self.nodes.len());
        let mut current = self.root().map(|r| r.revision_id.clone());
        while let Some(id) = current {
            let Some(rev) = self.nodes.get(&id) else { break };
            out.push(rev);
            current = self.successor_of(&id);
        }
        Ok(out)
    }

    /// Yields revisions strictly after `id` in chain order.
    pub fn iter_from(&self, id: &str) -> MigraResult<Vec<&Revision>> {
        if !self.nodes.contains_key(id) {
            return Err(MigraError::plan(format!("revision '{id}' does not exist in the graph")));
        }
        self.check_cycles()?;
        self.check_divergence()?;
        self.check_single_root()?;

        let mut out = Vec::new();
        let mut current = self.successor_of(id);
        while let Some(cur) = current {
            let Some(rev) = self.nodes.get(&cur) else { break };
            out.push(rev);
            current = self.successor_of(&cur);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rev(id: &str, down: Option<&str>) -> Revision {
        Revision {
            revision_id: id.to_string(),
            down_revision_id: down.map(String::from),
            message: String::new(),
            author: None,
            tags: None,
            up_sql: None,
            down_sql: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let g = MigrationGraph::from_revisions(vec![]);
        assert!(g.iter().unwrap().is_empty());
        assert!(g.last().unwrap().is_none());
        assert!(g.root().is_none());
    }

    #[test]
    fn single_root_is_last() {
        let g = MigrationGraph::from_revisions(vec![rev("a", None)]);
        assert_eq!(g.root().unwrap().revision_id, "a");
        assert_eq!(g.last().unwrap().unwrap().revision_id, "a");
        assert_eq!(g.iter().unwrap().len(), 1);
    }

    #[test]
    fn chain_order_is_deterministic_regardless_of_insertion() {
        let g = MigrationGraph::from_revisions(vec![
            rev("c", Some("b")),
            rev("a", None),
            rev("b", Some("a")),
        ]);
        let ids: Vec<&str> = g.iter().unwrap().iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn iter_from_yields_strictly_after() {
        let g = MigrationGraph::from_revisions(vec![
            rev("a", None),
            rev("b", Some("a")),
            rev("c", Some("b")),
        ]);
        let ids: Vec<&str> = g.iter_from("a").unwrap().iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let ids: Vec<&str> = g.iter_from("c").unwrap().iter().map(|r| r.revision_id.as_str()).collect();
        assert!(ids.is_empty());
    }

    #[test]
    fn iter_from_missing_id_errors() {
        let g = MigrationGraph::from_revisions(vec![rev("a", None)]);
        assert!(g.iter_from("missing").is_err());
    }

    #[test]
    fn divergent_branch_detected() {
        let g = MigrationGraph::from_revisions(vec![
            rev("a", None),
            rev("b", Some("a")),
            rev("c", Some("a")),
        ]);
        let err = g.last().unwrap_err();
        match err {
            MigraError::DivergentBranch { node, mut successors } => {
                assert_eq!(node, "a");
                successors.sort();
                assert_eq!(successors, vec!["b", "c"]);
            }
            other => panic!("expected DivergentBranch, got {other:?}"),
        }
    }

    #[test]
    fn multiple_roots_detected() {
        let g = MigrationGraph::from_revisions(vec![rev("a", None), rev("b", None)]);
        let err = g.last().unwrap_err();
        match err {
            MigraError::MultipleRoots(mut roots) => {
                roots.sort();
                assert_eq!(roots, vec!["a", "b"]);
            }
            other => panic!("expected MultipleRoots, got {other:?}"),
        }
    }

    #[test]
    fn cycle_detected() {
        let g = MigrationGraph::from_revisions(vec![
            rev("a", Some("c")),
            rev("b", Some("a")),
            rev("c", Some("b")),
        ]);
        let err = g.last().unwrap_err();
        assert!(matches!(err, MigraError::CycleDetected(_)));
    }

    #[test]
    fn idempotent_build_same_nodes_and_edges() {
        let dir = std::env::temp_dir().join(format!("migra-graph-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("a.sql"),
            "/*\nTimestamp: 2026-01-01T00:00:00+00:00\nRevision ID: a\nRevises: none\nMessage: m\n*/\n\n-- UP\n\n-- DOWN\n",
        )
        .unwrap();

        let g1 = MigrationGraph::build(&dir).unwrap();
        let g2 = MigrationGraph::build(&dir).unwrap();
        assert_eq!(g1.iter().unwrap().len(), g2.iter().unwrap().len());
        assert_eq!(g1.root().unwrap().revision_id, g2.root().unwrap().revision_id);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn non_sql_file_is_invalid() {
        let dir = std::env::temp_dir().join(format!("migra-graph-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), "hi").unwrap();
        let err = MigrationGraph::build(&dir).unwrap_err();
        assert!(matches!(err, MigraError::InvalidMigrationFile { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
