//! Append-only assessment ledger
//!
//! Every recorded [`Assessment`] stays in the ledger forever. Recording is
//! serialized per scope hash; the "latest" pointer for a (scope, standard)
//! pair moves atomically with the append.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

use crate::models::{short_hash, Assessment, Finding};

type LatestKey = (String, String);

#[derive(Default)]
pub struct AssessmentLedger {
    entries: RwLock<Vec<Arc<Assessment>>>,
    /// (scope hash, standard name) -> index into `entries`
    latest: RwLock<HashMap<LatestKey, usize>>,
    scope_locks: DashMap<String, Arc<Mutex<()>>>,
    sequence: AtomicU64,
}

impl AssessmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Assessment>>> {
        self.entries.read().expect("ledger lock poisoned")
    }

    fn read_latest(&self) -> std::sync::RwLockReadGuard<'_, HashMap<LatestKey, usize>> {
        self.latest.read().expect("ledger lock poisoned")
    }

    /// Append an assessment, assigning its id and `supersedes` pointer
    pub fn record(&self, mut assessment: Assessment) -> Assessment {
        let lock = Arc::clone(
            self.scope_locks
                .entry(assessment.scope_hash.clone())
                .or_default()
                .value(),
        );
        let _scope_guard = lock.lock().expect("scope lock poisoned");

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        assessment.id = short_hash(
            &format!(
                "{}\n{}\n{}\n{}\n{}",
                assessment.scope_hash,
                assessment.standard.name,
                assessment.standard.version,
                assessment.generated_at.to_rfc3339(),
                seq
            ),
            20,
        );

        let key = (assessment.scope_hash.clone(), assessment.standard.name.clone());
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        let mut latest = self.latest.write().expect("ledger lock poisoned");

        assessment.supersedes = latest.get(&key).map(|&i| entries[i].id.clone());
        entries.push(Arc::new(assessment.clone()));
        latest.insert(key, entries.len() - 1);

        debug!(
            "Recorded assessment {} ({} v{}, {} findings)",
            assessment.id,
            assessment.standard.name,
            assessment.standard.version,
            assessment.findings.len()
        );
        assessment
    }

    /// Reload persisted assessments.
    ///
    /// Assessments of one run share a timestamp, so the latest pointer goes to
    /// the entry nothing supersedes rather than to the newest timestamp.
    pub fn restore(&self, mut assessments: Vec<Assessment>) {
        assessments.sort_by(|a, b| {
            a.generated_at
                .cmp(&b.generated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let superseded: HashSet<String> = assessments
            .iter()
            .filter_map(|a| a.supersedes.clone())
            .collect();

        let mut entries = self.entries.write().expect("ledger lock poisoned");
        let mut latest = self.latest.write().expect("ledger lock poisoned");
        for assessment in assessments {
            let key = (assessment.scope_hash.clone(), assessment.standard.name.clone());
            let is_head = !superseded.contains(&assessment.id);
            entries.push(Arc::new(assessment));
            if is_head {
                latest.insert(key, entries.len() - 1);
            }
        }
        self.sequence.store(entries.len() as u64, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<Assessment> {
        self.read_entries()
            .iter()
            .find(|a| a.id == id)
            .map(|a| Assessment::clone(a))
    }

    /// Latest assessment of a scope against a standard
    pub fn latest(&self, scope_hash: &str, standard: &str) -> Option<Assessment> {
        let idx = *self
            .read_latest()
            .get(&(scope_hash.to_string(), standard.to_string()))?;
        self.read_entries().get(idx).map(|a| Assessment::clone(a))
    }

    /// Latest assessment of every (scope, standard), oldest first
    pub fn latest_all(&self) -> Vec<Assessment> {
        let mut indices: Vec<usize> = self.read_latest().values().copied().collect();
        indices.sort_unstable();
        let entries = self.read_entries();
        indices
            .into_iter()
            .filter_map(|i| entries.get(i).map(|a| Assessment::clone(a)))
            .collect()
    }

    /// Full history in recording order
    pub fn history(&self) -> Vec<Assessment> {
        self.read_entries().iter().map(|a| Assessment::clone(a)).collect()
    }

    /// Findings for an artifact from the newest assessment of each standard
    /// whose scope includes it
    pub fn latest_findings_for(&self, artifact_id: &str) -> Vec<Finding> {
        let entries = self.read_entries();
        let mut seen = HashSet::new();
        let mut findings = Vec::new();
        for assessment in entries.iter().rev() {
            if !assessment.covers(artifact_id) || !seen.insert(assessment.standard.name.clone()) {
                continue;
            }
            findings.extend(assessment.findings_for(artifact_id).cloned());
        }
        findings
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }
}
