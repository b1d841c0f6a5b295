//! Artifact graph: requirements, test cases and traceability links
//!
//! The graph is an arena of artifacts addressed by stable string ids, backed
//! by a petgraph `StableDiGraph` so node indices survive removals.
//!
//! Concurrency model: the committed state lives behind `RwLock<Arc<_>>`.
//! Readers clone the `Arc` and get a consistent point-in-time
//! [`GraphSnapshot`]. Writers lock the artifact ids they touch, build the next
//! state on a private copy and swap it in only if every check passed, so a
//! rejected write leaves the graph exactly as it was.

use chrono::Utc;
use dashmap::DashMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use super::store_models::{
    ArtifactBundle, ArtifactNode, GraphExport, ImportSummary, LinkRelation, TraceLink,
};
use super::traits::TraceQuery;
use crate::errors::{EngineError, EngineResult, IntegrityViolation};
use crate::models::{
    Artifact, ArtifactKind, ArtifactRef, Requirement, RequirementStatus, TestCase,
};

/// Committed graph contents. Cheap to share, cloned only by writers.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    graph: StableDiGraph<ArtifactNode, TraceLink>,
    index: HashMap<String, NodeIndex>,
    /// Prior versions per artifact id, oldest first
    history: HashMap<String, Vec<Artifact>>,
    revision: u64,
}

/// Consistent, immutable point-in-time view of the graph
#[derive(Debug, Clone)]
pub struct GraphSnapshot(Arc<GraphState>);

impl Deref for GraphSnapshot {
    type Target = GraphState;

    fn deref(&self) -> &GraphState {
        &self.0
    }
}

// ==================== Read side ====================

impl GraphState {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&ArtifactNode> {
        self.index.get(id).and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.node(id).map(|n| &n.artifact)
    }

    /// Current version of an artifact, or `None` if unknown
    pub fn version_of(&self, id: &str) -> Option<u32> {
        self.get(id).map(Artifact::version)
    }

    /// A specific version, current or historical
    pub fn artifact_version(&self, id: &str, version: u32) -> Option<&Artifact> {
        match self.get(id) {
            Some(current) if current.version() == version => Some(current),
            _ => self
                .history
                .get(id)
                .and_then(|versions| versions.iter().find(|a| a.version() == version)),
        }
    }

    /// Prior versions of an artifact, oldest first
    pub fn history(&self, id: &str) -> &[Artifact] {
        self.history.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn artifact_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All current artifacts, sorted by id
    pub fn artifacts(&self) -> Vec<&Artifact> {
        let mut all: Vec<&Artifact> = self.nodes().map(|n| &n.artifact).collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// All links, sorted by (source, target, relation)
    pub fn links(&self) -> Vec<&TraceLink> {
        let mut links: Vec<&TraceLink> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_weight(e))
            .collect();
        links.sort_by(|a, b| a.key().cmp(&b.key()));
        links
    }

    pub fn has_link(&self, source: &str, target: &str, relation: LinkRelation) -> bool {
        self.find_edge(source, target, relation).is_some()
    }

    fn find_edge(
        &self,
        source: &str,
        target: &str,
        relation: LinkRelation,
    ) -> Option<petgraph::stable_graph::EdgeIndex> {
        let (&s, &t) = (self.index.get(source)?, self.index.get(target)?);
        self.graph
            .edges_directed(s, Direction::Outgoing)
            .find(|e| e.target() == t && e.weight().relation == relation)
            .map(|e| e.id())
    }

    fn nodes(&self) -> impl Iterator<Item = &ArtifactNode> + '_ {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx))
    }

    fn id_of(&self, idx: NodeIndex) -> Option<&str> {
        self.graph.node_weight(idx).map(|n| n.artifact.id())
    }

    fn is_live_requirement(&self, idx: NodeIndex) -> bool {
        self.graph
            .node_weight(idx)
            .and_then(|n| n.artifact.as_requirement())
            .is_some_and(|r| !r.is_superseded())
    }

    /// Requirements a test case verifies that are not superseded
    fn live_verified(&self, tc: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(tc, Direction::Outgoing)
            .filter(|e| e.weight().relation == LinkRelation::Verifies)
            .map(|e| e.target())
            .filter(|&t| self.is_live_requirement(t))
            .collect()
    }

    /// Test cases without a `verifies` link to a non-superseded requirement
    pub fn orphaned_test_cases(&self) -> Vec<String> {
        let mut orphans: Vec<String> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph[idx].artifact.kind() == ArtifactKind::TestCase
                    && self.live_verified(idx).is_empty()
            })
            .filter_map(|idx| self.id_of(idx).map(str::to_string))
            .collect();
        orphans.sort();
        orphans
    }

    /// `derivesFrom` cycles (strongly connected components) in the graph.
    ///
    /// Inserts reject cycles, so this only finds anything in data loaded
    /// from outside.
    pub fn derivation_cycles(&self) -> Vec<Vec<String>> {
        let mut filtered: DiGraph<NodeIndex, ()> = DiGraph::new();
        let mut idx_map: HashMap<NodeIndex, petgraph::graph::NodeIndex> = HashMap::new();
        let mut self_loops = Vec::new();

        for edge in self.graph.edge_indices() {
            let is_derivation = self
                .graph
                .edge_weight(edge)
                .is_some_and(|l| l.relation == LinkRelation::DerivesFrom);
            let Some((source, target)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            if !is_derivation {
                continue;
            }
            if source == target {
                self_loops.push(source);
                continue;
            }
            let s = *idx_map
                .entry(source)
                .or_insert_with(|| filtered.add_node(source));
            let t = *idx_map
                .entry(target)
                .or_insert_with(|| filtered.add_node(target));
            filtered.add_edge(s, t, ());
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&filtered)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut ids: Vec<String> = scc
                    .iter()
                    .filter_map(|&i| self.id_of(filtered[i]).map(str::to_string))
                    .collect();
                ids.sort();
                ids
            })
            .chain(
                self_loops
                    .into_iter()
                    .filter_map(|idx| self.id_of(idx).map(|id| vec![id.to_string()])),
            )
            .collect();
        cycles.sort();
        cycles
    }

    /// All structural invariant violations currently present
    pub fn integrity_violations(&self) -> Vec<IntegrityViolation> {
        let mut violations: Vec<IntegrityViolation> = self
            .orphaned_test_cases()
            .into_iter()
            .map(|test_case| IntegrityViolation::OrphanedTestCase { test_case })
            .collect();
        violations.extend(
            self.derivation_cycles()
                .into_iter()
                .map(|path| IntegrityViolation::DerivationCycle { path }),
        );
        violations
    }

    /// Shortest `derivesFrom` path from `from` to `to`, both inclusive
    fn derivation_path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut queue = VecDeque::new();
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited = HashSet::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(&p) = parent.get(&cursor) {
                    path.push(p);
                    cursor = p;
                }
                path.reverse();
                return Some(path);
            }
            for edge in self.graph.edges_directed(current, Direction::Outgoing) {
                if edge.weight().relation != LinkRelation::DerivesFrom {
                    continue;
                }
                if visited.insert(edge.target()) {
                    parent.insert(edge.target(), current);
                    queue.push_back(edge.target());
                }
            }
        }
        None
    }

    pub fn export(&self) -> GraphExport {
        let mut nodes: Vec<ArtifactNode> = self.nodes().cloned().collect();
        nodes.sort_by(|a, b| a.artifact.id().cmp(b.artifact.id()));

        let mut ids: Vec<&String> = self.history.keys().collect();
        ids.sort();
        let history = ids
            .into_iter()
            .flat_map(|id| self.history[id].iter().cloned())
            .collect();

        GraphExport {
            revision: self.revision,
            nodes,
            history,
            links: self.links().into_iter().cloned().collect(),
        }
    }
}

impl TraceQuery for GraphState {
    fn revision(&self) -> u64 {
        self.revision
    }

    fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.get(id)
    }

    fn requirements(&self) -> Vec<&Requirement> {
        self.artifacts()
            .into_iter()
            .filter_map(Artifact::as_requirement)
            .collect()
    }

    fn test_cases(&self) -> Vec<&TestCase> {
        self.artifacts()
            .into_iter()
            .filter_map(Artifact::as_test_case)
            .collect()
    }

    fn verifying_tests(&self, requirement_id: &str) -> Vec<String> {
        self.neighbors(requirement_id, Direction::Incoming, LinkRelation::Verifies)
    }

    fn verified_requirements(&self, test_case_id: &str) -> Vec<String> {
        self.neighbors(test_case_id, Direction::Outgoing, LinkRelation::Verifies)
    }

    fn links_of(&self, id: &str) -> Vec<&TraceLink> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut links: Vec<&TraceLink> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight())
            .collect();
        links.sort_by(|a, b| a.key().cmp(&b.key()));
        links.dedup_by(|a, b| a.key() == b.key());
        links
    }

    fn dependents(&self, id: &str, relations: &[LinkRelation]) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let Some(&start) = self.index.get(id) else {
            return out;
        };
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for edge in self.graph.edges_directed(current, Direction::Incoming) {
                if !relations.contains(&edge.weight().relation) {
                    continue;
                }
                if visited.insert(edge.source()) {
                    if let Some(dep) = self.id_of(edge.source()) {
                        out.insert(dep.to_string());
                    }
                    queue.push_back(edge.source());
                }
            }
        }
        out
    }
}

impl GraphState {
    fn neighbors(&self, id: &str, direction: Direction, relation: LinkRelation) -> Vec<String> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| e.weight().relation == relation)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.id_of(other).map(str::to_string)
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// ==================== Write side ====================
//
// Mutators run against a private copy inside `ArtifactGraph::commit`; an
// error discards the copy, so they may fail after partial changes.

impl GraphState {
    fn index_of(&self, id: &str) -> EngineResult<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::ArtifactNotFound(id.to_string()))
    }

    fn insert_node(&mut self, mut artifact: Artifact) -> EngineResult<ArtifactRef> {
        artifact.validate()?;
        if self.contains(artifact.id()) {
            return Err(EngineError::invalid_artifact(artifact.id(), "identifier already exists"));
        }
        stamp(&mut artifact, None);
        let reference = artifact.artifact_ref();
        let id = artifact.id().to_string();
        let idx = self.graph.add_node(ArtifactNode {
            artifact,
            revision: self.revision,
        });
        self.index.insert(id, idx);
        Ok(reference)
    }

    pub(crate) fn insert_requirement(&mut self, req: Requirement) -> EngineResult<ArtifactRef> {
        self.insert_node(Artifact::Requirement(req))
    }

    pub(crate) fn insert_test_case<S: AsRef<str>>(
        &mut self,
        tc: TestCase,
        verifies: &[S],
    ) -> EngineResult<ArtifactRef> {
        tc.validate()?;
        let id = tc.id.clone();
        if verifies.is_empty() {
            return Err(IntegrityViolation::OrphanedTestCase { test_case: id }.into());
        }
        let reference = self.insert_node(Artifact::TestCase(tc))?;
        for target in verifies {
            self.add_link(&id, target.as_ref(), LinkRelation::Verifies)?;
        }
        self.ensure_not_orphaned(&id)?;
        Ok(reference)
    }

    fn ensure_not_orphaned(&self, test_case: &str) -> EngineResult<()> {
        let idx = self.index_of(test_case)?;
        if self.live_verified(idx).is_empty() {
            return Err(IntegrityViolation::OrphanedTestCase {
                test_case: test_case.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Replace the current version; the old one moves to history.
    /// Identical content is a no-op.
    fn revise_node(&mut self, mut next: Artifact) -> EngineResult<(ArtifactRef, bool)> {
        next.validate()?;
        let idx = self.index_of(next.id())?;
        let current = &self.graph[idx].artifact;
        if current.kind() != next.kind() {
            return Err(EngineError::invalid_artifact(
                next.id(),
                format!("cannot revise a {} as a {}", current.kind(), next.kind()),
            ));
        }

        let unchanged = match (current, &next) {
            (Artifact::Requirement(a), Artifact::Requirement(b)) => a.same_content(b),
            (Artifact::TestCase(a), Artifact::TestCase(b)) => a.same_content(b),
            _ => false,
        };
        if unchanged {
            return Ok((current.artifact_ref(), false));
        }

        let mut previous = current.clone();
        if let Artifact::Requirement(r) = &mut previous {
            r.status = RequirementStatus::Superseded;
        }
        stamp(&mut next, Some(&previous));
        let reference = next.artifact_ref();

        self.history
            .entry(previous.id().to_string())
            .or_default()
            .push(previous);
        self.graph[idx] = ArtifactNode {
            artifact: next,
            revision: self.revision,
        };
        Ok((reference, true))
    }

    pub(crate) fn revise_requirement(&mut self, req: Requirement) -> EngineResult<(ArtifactRef, bool)> {
        if req.is_superseded() {
            return Err(EngineError::invalid_artifact(
                &req.id,
                "a revision cannot be superseded; retire the requirement instead",
            ));
        }
        let id = req.id.clone();
        let result = self.revise_node(Artifact::Requirement(req))?;
        self.ensure_dependents_not_orphaned(&id)?;
        Ok(result)
    }

    pub(crate) fn revise_test_case(&mut self, tc: TestCase) -> EngineResult<(ArtifactRef, bool)> {
        self.revise_node(Artifact::TestCase(tc))
    }

    fn ensure_dependents_not_orphaned(&self, requirement: &str) -> EngineResult<()> {
        for tc in self.verifying_tests(requirement) {
            self.ensure_not_orphaned(&tc)?;
        }
        Ok(())
    }

    pub(crate) fn set_status(&mut self, id: &str, status: RequirementStatus) -> EngineResult<ArtifactRef> {
        let idx = self.index_of(id)?;
        let revision = self.revision;
        let node = &mut self.graph[idx];
        let Artifact::Requirement(req) = &mut node.artifact else {
            return Err(EngineError::invalid_artifact(id, "only requirements carry a status"));
        };
        req.status = status;
        req.revised_at = Utc::now();
        node.revision = revision;
        let reference = node.artifact.artifact_ref();
        self.ensure_dependents_not_orphaned(id)?;
        Ok(reference)
    }

    pub(crate) fn add_link(
        &mut self,
        source: &str,
        target: &str,
        relation: LinkRelation,
    ) -> EngineResult<TraceLink> {
        let s = self.index_of(source)?;
        let t = self.index_of(target)?;
        if source == target {
            if relation == LinkRelation::DerivesFrom {
                return Err(IntegrityViolation::DerivationCycle {
                    path: vec![source.to_string(), source.to_string()],
                }
                .into());
            }
            return Err(EngineError::invalid_artifact(source, "an artifact cannot link to itself"));
        }

        if relation == LinkRelation::Verifies {
            let source_kind = self.graph[s].artifact.kind();
            let target_kind = self.graph[t].artifact.kind();
            if source_kind != ArtifactKind::TestCase || target_kind != ArtifactKind::Requirement {
                return Err(EngineError::invalid_artifact(
                    source,
                    format!("verifies links run from a test case to a requirement, got {source_kind} -> {target_kind}"),
                ));
            }
        }

        if self.has_link(source, target, relation) {
            return Err(IntegrityViolation::DuplicateLink {
                source_id: source.to_string(),
                target_id: target.to_string(),
                relation: relation.to_string(),
            }
            .into());
        }

        if relation == LinkRelation::DerivesFrom {
            if let Some(path) = self.derivation_path(t, s) {
                let mut ids = vec![source.to_string()];
                ids.extend(path.iter().filter_map(|&i| self.id_of(i).map(str::to_string)));
                return Err(IntegrityViolation::DerivationCycle { path: ids }.into());
            }
        }

        let link = TraceLink::new(source, target, relation);
        self.graph.add_edge(s, t, link.clone());
        Ok(link)
    }

    pub(crate) fn remove_link(
        &mut self,
        source: &str,
        target: &str,
        relation: LinkRelation,
    ) -> EngineResult<TraceLink> {
        let edge = self
            .find_edge(source, target, relation)
            .ok_or_else(|| EngineError::LinkNotFound {
                source_id: source.to_string(),
                target_id: target.to_string(),
                relation: relation.to_string(),
            })?;
        let link = self
            .graph
            .remove_edge(edge)
            .ok_or_else(|| EngineError::ArtifactNotFound(source.to_string()))?;
        if relation == LinkRelation::Verifies {
            self.ensure_not_orphaned(source)?;
        }
        Ok(link)
    }

    /// Physically remove an artifact that nothing links to any more.
    /// Test cases take their own outgoing links with them.
    pub(crate) fn remove_artifact(&mut self, id: &str) -> EngineResult<Artifact> {
        let idx = self.index_of(id)?;
        let incoming = self.graph.edges_directed(idx, Direction::Incoming).count();
        let outgoing = self.graph.edges_directed(idx, Direction::Outgoing).count();
        let blocking = match self.graph[idx].artifact.kind() {
            ArtifactKind::Requirement => incoming + outgoing,
            ArtifactKind::TestCase => incoming,
        };
        if blocking > 0 {
            return Err(IntegrityViolation::ReferencedArtifact {
                id: id.to_string(),
                links: blocking,
            }
            .into());
        }
        self.index.remove(id);
        self.graph
            .remove_node(idx)
            .map(|n| n.artifact)
            .ok_or_else(|| EngineError::ArtifactNotFound(id.to_string()))
    }

    /// Apply an ingestion bundle: new ids are inserted, changed ones revised,
    /// identical ones and already-present links skipped.
    pub(crate) fn apply_bundle(&mut self, bundle: ArtifactBundle) -> EngineResult<ImportSummary> {
        let mut summary = ImportSummary::default();

        for req in bundle.requirements {
            let id = req.id.clone();
            if self.contains(&id) {
                let (_, changed) = self.revise_requirement(req)?;
                if changed {
                    summary.revised.push(id);
                } else {
                    summary.unchanged.push(id);
                }
            } else {
                self.insert_requirement(req)?;
                summary.added.push(id);
            }
        }

        for record in bundle.test_cases {
            let id = record.test_case.id.clone();
            if self.contains(&id) {
                let (_, changed) = self.revise_test_case(record.test_case)?;
                for target in &record.verifies {
                    if !self.has_link(&id, target, LinkRelation::Verifies) {
                        self.add_link(&id, target, LinkRelation::Verifies)?;
                        summary.links_added += 1;
                    }
                }
                if changed {
                    summary.revised.push(id);
                } else {
                    summary.unchanged.push(id);
                }
            } else {
                let mut targets = record.verifies.clone();
                targets.sort();
                targets.dedup();
                self.insert_test_case(record.test_case, &targets)?;
                summary.links_added += targets.len();
                summary.added.push(id);
            }
        }

        for spec in bundle.links {
            if !self.has_link(&spec.source, &spec.target, spec.relation) {
                self.add_link(&spec.source, &spec.target, spec.relation)?;
                summary.links_added += 1;
            }
        }

        Ok(summary)
    }

    /// Rebuild state from an export. Integrity problems in the loaded data
    /// are logged, not repaired.
    fn from_export(export: GraphExport) -> EngineResult<Self> {
        let mut state = GraphState {
            revision: export.revision,
            ..Default::default()
        };
        for node in export.nodes {
            let id = node.artifact.id().to_string();
            if state.contains(&id) {
                return Err(EngineError::invalid_artifact(&id, "duplicate artifact in stored graph"));
            }
            let idx = state.graph.add_node(node);
            state.index.insert(id, idx);
        }
        for artifact in export.history {
            state
                .history
                .entry(artifact.id().to_string())
                .or_default()
                .push(artifact);
        }
        for link in export.links {
            let s = state.index_of(&link.source)?;
            let t = state.index_of(&link.target)?;
            state.graph.add_edge(s, t, link);
        }
        for violation in state.integrity_violations() {
            warn!("Loaded graph violates an invariant: {}", violation);
        }
        Ok(state)
    }
}

/// Set version bookkeeping for a new or revised artifact
fn stamp(artifact: &mut Artifact, previous: Option<&Artifact>) {
    let now = Utc::now();
    let version = previous.map_or(artifact.version(), |p| p.version() + 1);
    let supersedes = previous.map(Artifact::artifact_ref);
    match artifact {
        Artifact::Requirement(r) => {
            r.version = version;
            r.revised_at = now;
            if previous.is_some() {
                r.supersedes = supersedes;
            }
        }
        Artifact::TestCase(t) => {
            t.version = version;
            t.revised_at = now;
        }
    }
}

/// Shared, concurrently readable artifact graph
#[derive(Default)]
pub struct ArtifactGraph {
    state: RwLock<Arc<GraphState>>,
    /// Per-id queue in front of the state lock. Writers on the same ids are
    /// admitted in arrival order; the state lock alone makes no such promise.
    /// Entries are dropped once their artifact is gone and nobody waits on them.
    artifact_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ArtifactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_export(export: GraphExport) -> EngineResult<Self> {
        Ok(Self {
            state: RwLock::new(Arc::new(GraphState::from_export(export)?)),
            artifact_locks: DashMap::new(),
        })
    }

    // ==================== Lock Helpers ====================
    //
    // Poisoning means a writer panicked mid-commit; there is nothing a caller
    // could do about it, so these helpers centralise the `.expect()` calls.

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Arc<GraphState>> {
        self.state
            .read()
            .expect("graph lock poisoned: a thread panicked while holding this lock")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, Arc<GraphState>> {
        self.state
            .write()
            .expect("graph lock poisoned: a thread panicked while holding this lock")
    }

    /// Consistent point-in-time view; unaffected by later writes
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot(Arc::clone(&self.read_state()))
    }

    pub fn revision(&self) -> u64 {
        self.read_state().revision
    }

    pub fn get(&self, id: &str) -> Option<Artifact> {
        self.read_state().get(id).cloned()
    }

    /// Run `mutate` on a private copy of the state and publish it as the next
    /// revision if it succeeds.
    ///
    /// The state write lock is held for the whole mutation, so commits are
    /// serialised. The per-id locks taken first only order writers that
    /// contend for the same artifacts.
    fn commit<T>(
        &self,
        ids: &[&str],
        op: &str,
        mutate: impl FnOnce(&mut GraphState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut sorted: Vec<&str> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let locks: Vec<Arc<Mutex<()>>> = sorted
            .iter()
            .map(|id| Arc::clone(self.artifact_locks.entry(id.to_string()).or_default().value()))
            .collect();

        let result = {
            let _guards: Vec<_> = locks
                .iter()
                .map(|l| l.lock().expect("artifact lock poisoned"))
                .collect();

            let mut current = self.write_state();
            let mut next = GraphState::clone(&current);
            next.revision += 1;
            match mutate(&mut next) {
                Ok(out) => {
                    debug!("Graph {} committed at revision {}", op, next.revision);
                    *current = Arc::new(next);
                    Ok(out)
                }
                Err(e) => {
                    warn!("Rejected graph {}: {}", op, e);
                    Err(e)
                }
            }
        };

        drop(locks);
        self.prune_locks(&sorted);
        result
    }

    /// Drop lock entries for ids that no longer name an artifact. An entry
    /// still cloned by a waiting writer is kept.
    fn prune_locks(&self, ids: &[&str]) {
        let state = Arc::clone(&self.read_state());
        for id in ids {
            if state.get(id).is_none() {
                self.artifact_locks
                    .remove_if(*id, |_, lock| Arc::strong_count(lock) == 1);
            }
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.artifact_locks.len()
    }

    pub fn add_requirement(&self, req: Requirement) -> EngineResult<ArtifactRef> {
        let id = req.id.clone();
        self.commit(&[&id], "add_requirement", |s| s.insert_requirement(req))
    }

    /// Insert a test case together with its `verifies` links. At least one
    /// target must be a non-superseded requirement.
    pub fn add_test_case<S: AsRef<str>>(&self, tc: TestCase, verifies: &[S]) -> EngineResult<ArtifactRef> {
        let id = tc.id.clone();
        let mut ids: Vec<&str> = verifies.iter().map(AsRef::as_ref).collect();
        ids.push(&id);
        self.commit(&ids, "add_test_case", |s| s.insert_test_case(tc, verifies))
    }

    /// Store a new version of a requirement. Returns the resulting reference
    /// (unchanged if the content is identical).
    pub fn revise_requirement(&self, req: Requirement) -> EngineResult<ArtifactRef> {
        let id = req.id.clone();
        self.commit(&[&id], "revise_requirement", |s| {
            s.revise_requirement(req).map(|(r, _)| r)
        })
    }

    pub fn revise_test_case(&self, tc: TestCase) -> EngineResult<ArtifactRef> {
        let id = tc.id.clone();
        self.commit(&[&id], "revise_test_case", |s| {
            s.revise_test_case(tc).map(|(r, _)| r)
        })
    }

    pub fn set_status(&self, id: &str, status: RequirementStatus) -> EngineResult<ArtifactRef> {
        self.commit(&[id], "set_status", |s| s.set_status(id, status))
    }

    /// Mark a requirement superseded. Refused if a test case would be left
    /// without a live requirement to verify.
    pub fn retire_requirement(&self, id: &str) -> EngineResult<ArtifactRef> {
        self.set_status(id, RequirementStatus::Superseded)
    }

    pub fn link(&self, source: &str, target: &str, relation: LinkRelation) -> EngineResult<TraceLink> {
        self.commit(&[source, target], "link", |s| s.add_link(source, target, relation))
    }

    pub fn unlink(&self, source: &str, target: &str, relation: LinkRelation) -> EngineResult<TraceLink> {
        self.commit(&[source, target], "unlink", |s| s.remove_link(source, target, relation))
    }

    /// Delete an artifact. Refused while any link still references it.
    pub fn remove(&self, id: &str) -> EngineResult<Artifact> {
        self.commit(&[id], "remove", |s| s.remove_artifact(id))
    }

    /// Apply a whole bundle atomically
    pub fn import(&self, bundle: ArtifactBundle) -> EngineResult<ImportSummary> {
        let ids = bundle.ids();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.commit(&id_refs, "import", |s| s.apply_bundle(bundle))
    }

    pub fn integrity_check(&self) -> Vec<IntegrityViolation> {
        self.read_state().integrity_violations()
    }

    pub fn export(&self) -> GraphExport {
        self.read_state().export()
    }
}
