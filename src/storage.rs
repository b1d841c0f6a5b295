//! Workspace persistence using redb
//!
//! Everything lives in `<workspace>/.regtrace/engine.redb`, one table per
//! record kind, values serialized as JSON:
//!
//! | table         | key                                 | value              |
//! |---------------|-------------------------------------|--------------------|
//! | `rulesets`    | `name@version`                      | `StandardRuleSet`  |
//! | `artifacts`   | artifact id                         | `ArtifactNode`     |
//! | `history`     | `id@vN`                             | prior `Artifact`   |
//! | `links`       | `__links__`                         | `Vec<TraceLink>`   |
//! | `findings`    | `artifact@vN\|standard\|rule@vN`    | `Vec<Finding>`     |
//! | `assessments` | `scope\|standard\|generated-at\|id`| `Assessment`       |
//! | `meta`        | `revision`                          | graph revision     |
//!
//! Rule sets, findings and assessments are append-only; the graph tables are
//! rewritten on every save.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::assessor::AssessmentLedger;
use crate::config::{load_project_config, ProjectConfig};
use crate::errors::EngineError;
use crate::graph::{ArtifactGraph, ArtifactNode, GraphExport, TraceLink};
use crate::models::{Artifact, Assessment, Finding};
use crate::rules::{builtin_standards, load_rule_pack, RuleStore, StandardRuleSet};

pub const DATA_DIR: &str = ".regtrace";
pub const DB_FILE: &str = "engine.redb";

// redb table definitions
const RULESETS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("rulesets");
const ARTIFACTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artifacts");
const HISTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("history");
const LINKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("links");
const FINDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("findings");
const ASSESSMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("assessments");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const LINKS_KEY: &str = "__links__";
const REVISION_KEY: &str = "revision";

fn finding_key(f: &Finding) -> String {
    format!(
        "{}@v{}|{}|{}@v{}",
        f.artifact_id, f.artifact_version, f.standard, f.rule_id, f.rule_version
    )
}

fn assessment_key(a: &Assessment) -> String {
    format!(
        "{}|{}|{}|{}",
        a.scope_hash,
        a.standard.name,
        a.generated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        a.id
    )
}

/// Handle on the workspace database
pub struct EngineStore {
    db: Database,
    path: PathBuf,
}

impl EngineStore {
    /// Create or open the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let db = Database::create(path).context("Failed to open redb database")?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==================== Graph ====================

    /// Replace the stored graph with `export`
    pub fn save_graph(&self, export: &GraphExport) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.delete_table(ARTIFACTS_TABLE)?;
            write_txn.delete_table(HISTORY_TABLE)?;

            let mut artifacts = write_txn.open_table(ARTIFACTS_TABLE)?;
            for node in &export.nodes {
                let value = serde_json::to_vec(node)?;
                artifacts.insert(node.artifact.id(), value.as_slice())?;
            }

            let mut history = write_txn.open_table(HISTORY_TABLE)?;
            for artifact in &export.history {
                let key = artifact.artifact_ref().to_string();
                let value = serde_json::to_vec(artifact)?;
                history.insert(key.as_str(), value.as_slice())?;
            }

            let links_data = serde_json::to_vec(&export.links)?;
            let mut links = write_txn.open_table(LINKS_TABLE)?;
            links.insert(LINKS_KEY, links_data.as_slice())?;

            let mut meta = write_txn.open_table(META_TABLE)?;
            meta.insert(REVISION_KEY, export.revision)?;
        }
        write_txn.commit()?;
        debug!(
            "Saved graph revision {} ({} artifacts, {} links)",
            export.revision,
            export.nodes.len(),
            export.links.len()
        );
        Ok(())
    }

    /// Load the stored graph; `None` for a fresh database
    pub fn load_graph(&self) -> Result<Option<GraphExport>> {
        let read_txn = self.db.begin_read()?;

        // A missing artifacts table means a fresh database
        let artifacts = match read_txn.open_table(ARTIFACTS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut export = GraphExport::default();
        for item in artifacts.iter()? {
            let (_, value) = item?;
            let node: ArtifactNode = serde_json::from_slice(value.value())?;
            export.nodes.push(node);
        }

        if let Ok(history) = read_txn.open_table(HISTORY_TABLE) {
            for item in history.iter()? {
                let (_, value) = item?;
                let artifact: Artifact = serde_json::from_slice(value.value())?;
                export.history.push(artifact);
            }
            // Keys sort lexically, so v10 would precede v9
            export
                .history
                .sort_by(|a, b| a.id().cmp(b.id()).then(a.version().cmp(&b.version())));
        }

        if let Ok(links) = read_txn.open_table(LINKS_TABLE) {
            if let Some(entry) = links.get(LINKS_KEY)? {
                let stored: Vec<TraceLink> = serde_json::from_slice(entry.value())?;
                export.links = stored;
            }
        }

        if let Ok(meta) = read_txn.open_table(META_TABLE) {
            if let Some(entry) = meta.get(REVISION_KEY)? {
                export.revision = entry.value();
            }
        }

        Ok(Some(export))
    }

    // ==================== Rules ====================

    /// Store rule sets not yet present; stored versions are never replaced
    pub fn save_rule_sets<'a>(&self, sets: impl IntoIterator<Item = &'a StandardRuleSet>) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let mut added = 0;
        {
            let mut table = write_txn.open_table(RULESETS_TABLE)?;
            for set in sets {
                let key = format!("{}@{}", set.name, set.version);
                if table.get(key.as_str())?.is_some() {
                    continue;
                }
                let value = serde_json::to_vec(set)?;
                table.insert(key.as_str(), value.as_slice())?;
                added += 1;
            }
        }
        write_txn.commit()?;
        Ok(added)
    }

    pub fn load_rule_sets(&self) -> Result<Vec<StandardRuleSet>> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(RULESETS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut sets = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            let set: StandardRuleSet = serde_json::from_slice(value.value())
                .with_context(|| format!("Corrupt rule set {}", key.value()))?;
            sets.push(set);
        }
        Ok(sets)
    }

    // ==================== Assessments ====================

    /// Append assessments and their findings. Already-stored assessments are
    /// left untouched.
    pub fn save_assessments<'a>(&self, assessments: impl IntoIterator<Item = &'a Assessment>) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let mut added = 0;
        {
            let mut table = write_txn.open_table(ASSESSMENTS_TABLE)?;
            let mut findings = write_txn.open_table(FINDINGS_TABLE)?;
            for assessment in assessments {
                let key = assessment_key(assessment);
                if table.get(key.as_str())?.is_some() {
                    continue;
                }
                let value = serde_json::to_vec(assessment)?;
                table.insert(key.as_str(), value.as_slice())?;
                added += 1;

                for finding in &assessment.findings {
                    let fkey = finding_key(finding);
                    let mut stored: Vec<Finding> = match findings.get(fkey.as_str())? {
                        Some(entry) => serde_json::from_slice(entry.value())?,
                        None => Vec::new(),
                    };
                    stored.push(finding.clone());
                    let value = serde_json::to_vec(&stored)?;
                    findings.insert(fkey.as_str(), value.as_slice())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(added)
    }

    /// All stored assessments in key order
    pub fn load_assessments(&self) -> Result<Vec<Assessment>> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(ASSESSMENTS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut assessments = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            assessments.push(serde_json::from_slice(value.value())?);
        }
        Ok(assessments)
    }

    /// Every finding ever recorded for one artifact version, oldest first
    pub fn findings_for(&self, artifact_id: &str, version: u32) -> Result<Vec<Finding>> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(FINDINGS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let prefix = format!("{artifact_id}@v{version}|");
        let mut out = Vec::new();
        for item in table.range::<&str>(prefix.as_str()..)? {
            let (key, value) = item?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let stored: Vec<Finding> = serde_json::from_slice(value.value())?;
            out.extend(stored);
        }
        out.sort_by(|a, b| a.evaluated_at.cmp(&b.evaluated_at).then_with(|| a.rule_id.cmp(&b.rule_id)));
        Ok(out)
    }
}

/// Everything a command needs: configuration, rules, graph and ledger,
/// optionally backed by the workspace database
pub struct Workspace {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub rules: RuleStore,
    pub graph: ArtifactGraph,
    pub ledger: AssessmentLedger,
    store: Option<EngineStore>,
}

impl Workspace {
    pub fn db_path(root: &Path) -> PathBuf {
        root.join(DATA_DIR).join(DB_FILE)
    }

    pub fn is_initialized(root: &Path) -> bool {
        Self::db_path(root).exists()
    }

    /// Open (or create) the workspace at `root`.
    ///
    /// Rule sets are registered in this order: previously persisted ones,
    /// then built-ins, then configured packs. A built-in that conflicts with a
    /// persisted version keeps the persisted body.
    pub fn open(root: &Path) -> Result<Self> {
        let config = load_project_config(root);
        let store = EngineStore::open(&Self::db_path(root))?;

        let rules = RuleStore::new();
        for set in store.load_rule_sets()? {
            let name = format!("{} v{}", set.name, set.version);
            rules
                .register(set)
                .with_context(|| format!("Stored rule set {name} is invalid"))?;
        }
        Self::register_configured(root, &config, &rules)?;

        let graph = match store.load_graph()? {
            Some(export) => ArtifactGraph::from_export(export).context("Stored graph is invalid")?,
            None => ArtifactGraph::new(),
        };

        let ledger = AssessmentLedger::new();
        ledger.restore(store.load_assessments()?);

        info!(
            "Opened workspace {} ({} standard versions, {} assessments, graph revision {})",
            root.display(),
            rules.len(),
            ledger.len(),
            graph.revision()
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            rules,
            graph,
            ledger,
            store: Some(store),
        })
    }

    /// Workspace with no database; nothing is persisted
    pub fn in_memory(root: &Path, config: ProjectConfig) -> Result<Self> {
        let rules = RuleStore::new();
        Self::register_configured(root, &config, &rules)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            rules,
            graph: ArtifactGraph::new(),
            ledger: AssessmentLedger::new(),
            store: None,
        })
    }

    fn register_configured(root: &Path, config: &ProjectConfig, rules: &RuleStore) -> Result<()> {
        if config.rules.builtin {
            for set in builtin_standards() {
                match rules.register(set) {
                    Ok(_) => {}
                    Err(e @ EngineError::RuleVersionConflict { .. }) => {
                        warn!("Keeping stored rules: {}", e);
                    }
                    Err(e) => return Err(e).context("Built-in rule set is invalid"),
                }
            }
        }

        for pack in &config.rules.packs {
            let path = if pack.is_absolute() {
                pack.clone()
            } else {
                root.join(pack)
            };
            for set in load_rule_pack(&path)? {
                rules
                    .register(set)
                    .with_context(|| format!("Failed to register rules from {}", path.display()))?;
            }
        }
        Ok(())
    }

    pub fn store(&self) -> Option<&EngineStore> {
        self.store.as_ref()
    }

    /// Persist rule sets, the graph and the full assessment history
    pub fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let sets = self.rules.rule_sets();
        let new_sets = store.save_rule_sets(sets.iter().map(|s| s.as_ref()))?;
        store.save_graph(&self.graph.export())?;
        let history = self.ledger.history();
        let new_assessments = store.save_assessments(&history)?;
        debug!(
            "Saved workspace: {} new rule set(s), {} new assessment(s)",
            new_sets, new_assessments
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessor::{ComplianceAssessor, StandardSelector};
    use crate::graph::LinkRelation;
    use crate::models::{Requirement, TestCase};
    use tempfile::tempdir;

    #[test]
    fn test_workspace_round_trip() {
        let dir = tempdir().unwrap();
        let first_id;
        {
            let ws = Workspace::open(dir.path()).unwrap();
            ws.graph
                .add_requirement(Requirement::new("R1", "Audit", "Access is written to the audit trail"))
                .unwrap();
            ws.graph
                .add_requirement(Requirement::new("R2", "Detail", "Audit entries carry a timestamp"))
                .unwrap();
            ws.graph.link("R2", "R1", LinkRelation::DerivesFrom).unwrap();
            ws.graph
                .add_test_case(
                    TestCase::new("T1", "Audit test").with_step("Open record", "Entry logged"),
                    &["R1"],
                )
                .unwrap();
            ws.graph
                .revise_requirement(Requirement::new("R1", "Audit", "All access is written to the audit trail"))
                .unwrap();

            let run = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
                .assess(&["R1", "R2", "T1"], &[StandardSelector::latest("HIPAA")])
                .unwrap();
            first_id = run.assessments[0].id.clone();
            ws.save().unwrap();
        }

        let ws = Workspace::open(dir.path()).unwrap();
        let snapshot = ws.graph.snapshot();
        assert_eq!(snapshot.artifact_count(), 3);
        assert_eq!(snapshot.link_count(), 2);
        assert_eq!(snapshot.version_of("R1"), Some(2));
        assert_eq!(snapshot.history("R1").len(), 1);
        assert_eq!(ws.graph.revision(), 5);
        assert_eq!(ws.ledger.len(), 1);
        assert_eq!(ws.ledger.history()[0].id, first_id);
        assert!(ws.rules.is_known("HIPAA"));

        let store = ws.store().unwrap();
        let findings = store.findings_for("R1", 2).unwrap();
        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.artifact_id == "R1" && f.artifact_version == 2));
        assert!(store.findings_for("R1", 1).unwrap().is_empty());
    }

    #[test]
    fn test_save_is_append_only_for_assessments() {
        let dir = tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.graph
            .add_requirement(Requirement::new("R1", "PHI", "Patient data is kept private"))
            .unwrap();
        let assessor = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config);
        assessor.assess(&["R1"], &[StandardSelector::latest("HIPAA")]).unwrap();
        ws.save().unwrap();
        assessor.assess(&["R1"], &[StandardSelector::latest("HIPAA")]).unwrap();
        ws.save().unwrap();
        ws.save().unwrap();

        let store = ws.store().unwrap();
        assert_eq!(store.load_assessments().unwrap().len(), 2);
        // Two evaluations of the same (artifact, rule) pair
        let findings = store.findings_for("R1", 1).unwrap();
        let hipaa_001: Vec<_> = findings.iter().filter(|f| f.rule_id == "HIPAA_001").collect();
        assert_eq!(hipaa_001.len(), 2);
    }

    #[test]
    fn test_findings_are_keyed_per_standard() {
        let dir = tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.graph
            .add_requirement(Requirement::new("R1", "PHI", "Personal patient data is kept private"))
            .unwrap();
        ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
            .assess(
                &["R1"],
                &[StandardSelector::latest("HIPAA"), StandardSelector::latest("GDPR")],
            )
            .unwrap();
        ws.save().unwrap();

        let findings = ws.store().unwrap().findings_for("R1", 1).unwrap();
        assert!(findings.iter().any(|f| f.standard == "HIPAA"));
        assert!(findings.iter().any(|f| f.standard == "GDPR"));
        for f in &findings {
            assert_eq!(
                finding_key(f),
                format!("R1@v1|{}|{}@v{}", f.standard, f.rule_id, f.rule_version)
            );
        }
    }

    #[test]
    fn test_rule_pack_from_config() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("regtrace.toml"),
            "[rules]\nbuiltin = false\npacks = [\"acme.toml\"]\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("acme.toml"),
            r#"
name = "ACME"
version = "1"

[[rules]]
id = "ACME_001"
title = "Audit"
category = "audit"
mandatory = true
pattern = { kind = "keywords", any_of = ["audit trail"] }
"#,
        )
        .unwrap();

        let ws = Workspace::open(dir.path()).unwrap();
        assert!(ws.rules.is_known("ACME"));
        assert!(!ws.rules.is_known("HIPAA"));
        ws.save().unwrap();
        drop(ws);

        // Persisted packs survive removal from the config
        std::fs::write(dir.path().join("regtrace.toml"), "[rules]\nbuiltin = false\n").unwrap();
        let reopened = Workspace::open(dir.path()).unwrap();
        assert!(reopened.rules.is_known("ACME"));
    }

    #[test]
    fn test_in_memory_workspace_saves_nothing() {
        let dir = tempdir().unwrap();
        let ws = Workspace::in_memory(dir.path(), ProjectConfig::default()).unwrap();
        assert!(ws.rules.is_known("GDPR"));
        ws.save().unwrap();
        assert!(!Workspace::is_initialized(dir.path()));
    }
}
