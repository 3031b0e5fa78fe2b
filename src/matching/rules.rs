// src/matching/rules.rs - Matching rule definitions and the rule registry
use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::models::contact::ContactField;
use crate::models::contact::ContactField::*;

/// One exact-key matching rule: the ordered fields its key is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub id: String,
    pub label: String,
    pub fields: Vec<ContactField>,
}

impl MatchRule {
    pub fn new(id: &str, label: &str, fields: &[ContactField]) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            fields: fields.to_vec(),
        }
    }
}

const INDIVIDUAL: [ContactField; 3] = [Salutation, FirstName, LastName];
const SUFFICIENT_ADDRESS: [ContactField; 4] = [Street3, Street4, PostalCode, City];
const COMPLETE_ADDRESS: [ContactField; 6] = [Street1, Street2, Street3, Street4, PostalCode, City];
const MINIMAL_ADDRESS: [ContactField; 3] = [Street3, PostalCode, City];

fn fields_of(parts: &[&[ContactField]]) -> Vec<ContactField> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

fn rule(id: &str, label: &str, parts: &[&[ContactField]]) -> MatchRule {
    MatchRule {
        id: id.to_string(),
        label: label.to_string(),
        fields: fields_of(parts),
    }
}

/// Immutable, ordered set of rules. Built once at startup and passed
/// explicitly to whoever runs rules.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<MatchRule>,
    by_id: HashMap<String, usize>,
}

impl RuleRegistry {
    /// Validates ids (unique, non-empty, no `_` since ids prefix output
    /// file names) and that each rule has at least one field.
    pub fn from_rules(rules: Vec<MatchRule>) -> Result<Self> {
        let mut by_id = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            let id = rule.id.trim();
            if id.is_empty() {
                bail!("Rule #{} has an empty id", i + 1);
            }
            if id != rule.id || id.contains('_') {
                bail!("Rule id '{}' must not contain '_' or surrounding spaces", rule.id);
            }
            if rule.fields.is_empty() {
                bail!("Rule '{}' has no fields", rule.id);
            }
            if by_id.insert(rule.id.clone(), i).is_some() {
                bail!("Duplicate rule id '{}'", rule.id);
            }
        }
        Ok(Self { rules, by_id })
    }

    /// The 22-rule set: base rules (A), individual-level variants (B) and
    /// household-level variants (C).
    pub fn household_individual() -> Self {
        let rules = vec![
            rule("A0", "Individu × Adresse suffisante", &[&INDIVIDUAL, &SUFFICIENT_ADDRESS]),
            rule("A1", "Foyer × Adresse suffisante", &[&[LastName], &SUFFICIENT_ADDRESS]),
            rule("B0", "Individu × Adresse complète", &[&INDIVIDUAL, &COMPLETE_ADDRESS]),
            rule("B1", "Individu × Adresse minimale", &[&INDIVIDUAL, &MINIMAL_ADDRESS]),
            rule("B2", "Individu × Adresse suffisante × Email", &[&INDIVIDUAL, &SUFFICIENT_ADDRESS, &[Email]]),
            rule("B3", "Individu × Adresse suffisante × Mobile", &[&INDIVIDUAL, &SUFFICIENT_ADDRESS, &[MobilePhone]]),
            rule(
                "B4",
                "Individu × Adresse suffisante × Email × Mobile",
                &[&INDIVIDUAL, &SUFFICIENT_ADDRESS, &[Email, MobilePhone]],
            ),
            rule("B5", "Individu × Email seul", &[&INDIVIDUAL, &[Email]]),
            rule("B6", "Individu × Mobile seul", &[&INDIVIDUAL, &[MobilePhone]]),
            rule("B7", "Individu × Mobile et Home phone", &[&INDIVIDUAL, &[MobilePhone, HomePhone]]),
            rule("B8", "Individu × Email + Mobile", &[&INDIVIDUAL, &[Email, MobilePhone]]),
            rule(
                "B9",
                "Individu × Email + Mobile + Home phone",
                &[&INDIVIDUAL, &[Email, MobilePhone, HomePhone]],
            ),
            rule("C0", "Foyer × Adresse complète", &[&[LastName], &COMPLETE_ADDRESS]),
            rule("C1", "Foyer × Adresse minimale", &[&[LastName], &MINIMAL_ADDRESS]),
            rule("C2", "Foyer × Adresse suffisante × Email", &[&[LastName], &SUFFICIENT_ADDRESS, &[Email]]),
            rule("C3", "Foyer × Adresse suffisante × Mobile", &[&[LastName], &SUFFICIENT_ADDRESS, &[MobilePhone]]),
            rule(
                "C4",
                "Foyer × Adresse suffisante × Email × Mobile",
                &[&[LastName], &SUFFICIENT_ADDRESS, &[Email, MobilePhone]],
            ),
            rule("C5", "Foyer × Email seul", &[&[LastName, Email]]),
            rule("C6", "Foyer × Mobile seul", &[&[LastName, MobilePhone]]),
            rule("C7", "Foyer × Mobile et Home phone", &[&[LastName, MobilePhone, HomePhone]]),
            rule("C8", "Foyer × Email + Mobile", &[&[LastName, Email, MobilePhone]]),
            rule("C9", "Foyer × Email + Mobile + Home phone", &[&[LastName, Email, MobilePhone, HomePhone]]),
        ];
        Self::from_static(rules)
    }

    /// The earlier 9-rule set: the two base rules and the first seven
    /// individual-level variants.
    pub fn first_generation() -> Self {
        let current = Self::household_individual();
        let ids = ["A0", "A1", "B0", "B1", "B2", "B3", "B4", "B5", "B6"];
        let rules = ids
            .iter()
            .filter_map(|id| current.get(id).cloned())
            .collect();
        Self::from_static(rules)
    }

    fn from_static(rules: Vec<MatchRule>) -> Self {
        let by_id = rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self { rules, by_id }
    }

    /// Parses a JSON array of `{"id", "label", "fields"}` objects, fields
    /// given by their column codes.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rules: Vec<MatchRule> = serde_json::from_str(json).context("Failed to parse rule definitions")?;
        Self::from_rules(rules)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule file {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid rule file {}", path.display()))
    }

    pub fn get(&self, id: &str) -> Option<&MatchRule> {
        self.by_id.get(id).map(|&i| &self.rules[i])
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Picks rules by explicit id and/or id prefix, in registry order.
    /// With neither given, every rule is selected. Unknown ids and prefixes
    /// matching nothing are errors.
    pub fn select(&self, ids: &[String], prefixes: &[String]) -> Result<Vec<MatchRule>> {
        if ids.is_empty() && prefixes.is_empty() {
            return Ok(self.rules.clone());
        }
        let mut wanted = HashSet::new();
        for id in ids {
            if self.get(id).is_none() {
                bail!("Unknown rule id '{}' (known: {})", id, self.ids().join(", "));
            }
            wanted.insert(id.as_str());
        }
        for prefix in prefixes {
            let before = wanted.len();
            let mut matched = false;
            for rule in self.rules.iter().filter(|r| r.id.starts_with(prefix.as_str())) {
                matched = true;
                wanted.insert(rule.id.as_str());
            }
            if !matched {
                bail!("No rule found for prefix '{}'", prefix);
            }
            info!("Prefix '{}' selected {} additional rules", prefix, wanted.len() - before);
        }
        Ok(self
            .rules
            .iter()
            .filter(|r| wanted.contains(r.id.as_str()))
            .cloned()
            .collect())
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::household_individual()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registries() {
        let registry = RuleRegistry::household_individual();
        assert_eq!(registry.len(), 22);
        assert_eq!(
            registry.get("A0").unwrap().fields,
            vec![Salutation, FirstName, LastName, Street3, Street4, PostalCode, City]
        );
        assert_eq!(registry.get("C9").unwrap().fields, vec![LastName, Email, MobilePhone, HomePhone]);
        assert_eq!(
            registry.get("B0").unwrap().fields,
            vec![Salutation, FirstName, LastName, Street1, Street2, Street3, Street4, PostalCode, City]
        );

        let legacy = RuleRegistry::first_generation();
        assert_eq!(legacy.len(), 9);
        assert_eq!(legacy.ids(), vec!["A0", "A1", "B0", "B1", "B2", "B3", "B4", "B5", "B6"]);
    }

    #[test]
    fn test_select_by_prefix_and_id_keeps_registry_order() {
        let registry = RuleRegistry::household_individual();
        let selected = registry
            .select(&["C1".to_string()], &["A".to_string()])
            .unwrap();
        let ids: Vec<_> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A0", "A1", "C1"]);

        assert_eq!(registry.select(&[], &[]).unwrap().len(), 22);
        assert_eq!(registry.select(&[], &["B".to_string()]).unwrap().len(), 10);
        assert!(registry.select(&["Z9".to_string()], &[]).is_err());
        assert!(registry.select(&[], &["Z".to_string()]).is_err());
    }

    #[test]
    fn test_json_rules() {
        let json = r#"[
            {"id": "H1", "label": "Household postal", "fields": ["LN", "PC", "CITY"]},
            {"id": "E1", "label": "Email only", "fields": ["EMAIL"]}
        ]"#;
        let registry = RuleRegistry::from_json_str(json).unwrap();
        assert_eq!(registry.ids(), vec!["H1", "E1"]);
        assert_eq!(registry.get("H1").unwrap().fields, vec![LastName, PostalCode, City]);

        let duplicate = r#"[{"id": "X", "label": "", "fields": ["LN"]}, {"id": "X", "label": "", "fields": ["FN"]}]"#;
        assert!(RuleRegistry::from_json_str(duplicate).is_err());
        let no_fields = r#"[{"id": "X", "label": "", "fields": []}]"#;
        assert!(RuleRegistry::from_json_str(no_fields).is_err());
        let underscore = r#"[{"id": "X_1", "label": "", "fields": ["LN"]}]"#;
        assert!(RuleRegistry::from_json_str(underscore).is_err());
        let bad_field = r#"[{"id": "X", "label": "", "fields": ["STREET"]}]"#;
        assert!(RuleRegistry::from_json_str(bad_field).is_err());
        let lower_case = r#"[{"id": "L1", "label": "", "fields": ["ln", "Email"]}]"#;
        let registry = RuleRegistry::from_json_str(lower_case).unwrap();
        assert_eq!(registry.get("L1").unwrap().fields, vec![LastName, Email]);
    }
}
