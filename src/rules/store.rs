//! Rule store: registry of versioned standards
//!
//! The store is an explicit instance handed to every evaluation context.
//! Rule sets are keyed by (standard name, version) and never mutated after
//! registration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{compare_versions, Rule, StandardRuleSet};
use crate::errors::{EngineError, EngineResult};
use crate::models::{ArtifactKind, RiskLevel, StandardRef};

/// Per-standard counts, as shown by `regtrace standards`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StandardOverview {
    pub name: String,
    pub version: String,
    pub description: String,
    pub rules_count: usize,
    pub mandatory_rules: usize,
    pub high_risk_rules: usize,
}

#[derive(Default)]
pub struct RuleStore {
    sets: RwLock<BTreeMap<(String, String), Arc<StandardRuleSet>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the built-in standards
    pub fn with_builtin() -> EngineResult<Self> {
        let store = Self::new();
        for set in super::builtin_standards() {
            store.register(set)?;
        }
        Ok(store)
    }

    fn read_sets(&self) -> RwLockReadGuard<'_, BTreeMap<(String, String), Arc<StandardRuleSet>>> {
        self.sets.read().expect("rule store lock poisoned")
    }

    fn write_sets(&self) -> RwLockWriteGuard<'_, BTreeMap<(String, String), Arc<StandardRuleSet>>> {
        self.sets.write().expect("rule store lock poisoned")
    }

    /// Register a rule set.
    ///
    /// Returns `Ok(true)` when newly registered and `Ok(false)` when an
    /// identical body was already present under the same (name, version).
    /// A rule (id, version) published by another version of the same
    /// standard must carry an identical body.
    pub fn register(&self, set: StandardRuleSet) -> EngineResult<bool> {
        let set = set.normalized()?;
        let key = (set.name.clone(), set.version.clone());

        let mut sets = self.write_sets();
        if let Some(existing) = sets.get(&key) {
            if **existing == set {
                debug!("Rule set {} v{} already registered", set.name, set.version);
                return Ok(false);
            }
            return Err(EngineError::RuleVersionConflict {
                standard: set.name,
                version: set.version,
                detail: "rule set is already registered with a different body".to_string(),
            });
        }

        if let Some(detail) = published_rule_conflict(&sets, &set) {
            return Err(EngineError::RuleVersionConflict {
                standard: set.name,
                version: set.version,
                detail,
            });
        }

        info!(
            "Registered {} v{} ({} rules, {} mandatory)",
            set.name,
            set.version,
            set.rules.len(),
            set.mandatory_count()
        );
        sets.insert(key, Arc::new(set));
        Ok(true)
    }

    /// Resolve a standard name (case-insensitive) and optional version pin to
    /// a registered (name, version).
    pub fn resolve(&self, name: &str, version: Option<&str>) -> EngineResult<StandardRef> {
        let sets = self.read_sets();
        let candidates = sets
            .keys()
            .filter(|(n, v)| {
                n.eq_ignore_ascii_case(name) && version.map_or(true, |pin| pin == v.as_str())
            });

        candidates
            .max_by(|a, b| compare_versions(&a.1, &b.1))
            .map(|(n, v)| StandardRef {
                name: n.clone(),
                version: v.clone(),
            })
            .ok_or_else(|| EngineError::unknown_standard(name, version))
    }

    /// The full rule set for (name, version); `None` version means latest
    pub fn rule_set(&self, name: &str, version: Option<&str>) -> EngineResult<Arc<StandardRuleSet>> {
        let standard = self.resolve(name, version)?;
        self.read_sets()
            .get(&(standard.name, standard.version))
            .cloned()
            .ok_or_else(|| EngineError::unknown_standard(name, version))
    }

    /// Ordered rules of a standard version
    pub fn load_standard(&self, name: &str, version: &str) -> EngineResult<Vec<Rule>> {
        Ok(self.rule_set(name, Some(version))?.rules.clone())
    }

    /// Rules of the latest version of `standard` applicable to `kind`
    pub fn rules_for(&self, kind: ArtifactKind, standard: &str) -> EngineResult<Vec<Rule>> {
        self.rules_for_version(kind, standard, None)
    }

    pub fn rules_for_version(
        &self,
        kind: ArtifactKind,
        standard: &str,
        version: Option<&str>,
    ) -> EngineResult<Vec<Rule>> {
        let set = self.rule_set(standard, version)?;
        Ok(set
            .rules
            .iter()
            .filter(|r| r.target.applies_to(kind))
            .cloned()
            .collect())
    }

    /// Look up one rule of a specific standard version
    pub fn find_rule(&self, standard: &StandardRef, rule_id: &str) -> Option<Rule> {
        self.read_sets()
            .get(&(standard.name.clone(), standard.version.clone()))
            .and_then(|set| set.rules.iter().find(|r| r.id == rule_id).cloned())
    }

    /// Categories of the mandatory rules a test case of `standard` must cover
    pub fn mandatory_categories(&self, standard: &str) -> EngineResult<BTreeSet<String>> {
        Ok(self
            .rules_for(ArtifactKind::TestCase, standard)?
            .into_iter()
            .filter(|r| r.mandatory && !r.category.is_empty())
            .map(|r| r.category)
            .collect())
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.resolve(name, None).is_ok()
    }

    /// All registered (name, version) pairs, sorted
    pub fn standards(&self) -> Vec<StandardRef> {
        self.read_sets()
            .keys()
            .map(|(name, version)| StandardRef {
                name: name.clone(),
                version: version.clone(),
            })
            .collect()
    }

    /// Latest version of every registered standard
    pub fn latest_standards(&self) -> Vec<StandardRef> {
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        for (name, version) in self.read_sets().keys() {
            match latest.get(name) {
                Some(current) if compare_versions(current, version).is_ge() => {}
                _ => {
                    latest.insert(name.clone(), version.clone());
                }
            }
        }
        latest
            .into_iter()
            .map(|(name, version)| StandardRef { name, version })
            .collect()
    }

    pub fn overview(&self) -> Vec<StandardOverview> {
        self.read_sets()
            .values()
            .map(|set| StandardOverview {
                name: set.name.clone(),
                version: set.version.clone(),
                description: set.description.clone(),
                rules_count: set.rules.len(),
                mandatory_rules: set.mandatory_count(),
                high_risk_rules: set
                    .rules
                    .iter()
                    .filter(|r| r.risk >= RiskLevel::High)
                    .count(),
            })
            .collect()
    }

    /// Every registered rule set, for persistence
    pub fn rule_sets(&self) -> Vec<Arc<StandardRuleSet>> {
        self.read_sets().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_sets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_sets().is_empty()
    }
}

/// First rule of `set` whose (id, version) another version of the same
/// standard already published with a different body
fn published_rule_conflict(
    sets: &BTreeMap<(String, String), Arc<StandardRuleSet>>,
    set: &StandardRuleSet,
) -> Option<String> {
    sets.values()
        .filter(|other| other.name == set.name)
        .find_map(|other| {
            set.rules.iter().find_map(|rule| {
                other
                    .rules
                    .iter()
                    .find(|r| r.id == rule.id && r.version == rule.version && *r != rule)
                    .map(|_| {
                        format!(
                            "rule {} v{} is already published by {} v{} with a different body",
                            rule.id, rule.version, other.name, other.version
                        )
                    })
            })
        })
}
