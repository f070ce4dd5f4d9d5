pub mod seeds;
pub mod similarity;

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::TaxonomyEntry;

pub use seeds::seed_entries;
pub use similarity::{
    normalize_phrase, scorer_by_name, JaroWinklerScorer, SimilarityScorer, TokenScorer, TrigramScorer,
};

/// The evolving set of canonical topics for one app, keyed by canonical name.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    app_id: String,
    entries: BTreeMap<String, TaxonomyEntry>,
    /// Persisted names folded away on load, paired with the entry they joined.
    folded: Vec<(String, String)>,
}

impl Taxonomy {
    pub fn new(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            entries: BTreeMap::new(),
            folded: Vec::new(),
        }
    }

    pub fn seeded(app_id: &str, created_at: NaiveDate) -> Self {
        let mut taxonomy = Self::new(app_id);
        for entry in seed_entries(created_at) {
            taxonomy.insert(entry);
        }
        taxonomy
    }

    /// Builds a taxonomy from persisted entries, folding any entries whose
    /// canonical names collide under normalization into the first one.
    pub fn from_entries(app_id: &str, entries: Vec<TaxonomyEntry>) -> Self {
        let mut taxonomy = Self::new(app_id);
        for entry in entries {
            if let Some(existing) = taxonomy.find_by_canonical(&entry.canonical_name) {
                let target = existing.canonical_name.clone();
                tracing::debug!(
                    "Folding duplicate topic '{}' into '{}'",
                    entry.canonical_name,
                    target
                );
                let mut aliases = entry.aliases;
                aliases.insert(normalize_phrase(&entry.canonical_name));
                for alias in aliases {
                    taxonomy.add_alias(&target, &alias);
                }
                taxonomy.folded.push((entry.canonical_name, target));
                continue;
            }
            taxonomy.insert(entry);
        }
        taxonomy
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TaxonomyEntry> {
        self.entries.values()
    }

    pub fn get(&self, canonical_name: &str) -> Option<&TaxonomyEntry> {
        self.entries.get(canonical_name)
    }

    /// Stored rows that no longer exist in memory; the next commit removes them.
    pub fn folded(&self) -> &[(String, String)] {
        &self.folded
    }

    pub fn canonical_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Entry whose canonical name equals `name` once both are normalized.
    pub fn find_by_canonical(&self, name: &str) -> Option<&TaxonomyEntry> {
        let wanted = normalize_phrase(name);
        self.entries
            .values()
            .find(|e| normalize_phrase(&e.canonical_name) == wanted)
    }

    /// Entry that already knows `phrase`, as its canonical name or an alias.
    pub fn find_by_phrase(&self, phrase: &str) -> Option<&TaxonomyEntry> {
        let wanted = normalize_phrase(phrase);
        self.entries.values().find(|e| {
            e.aliases.contains(&wanted) || normalize_phrase(&e.canonical_name) == wanted
        })
    }

    /// Returns false when the canonical name is already taken.
    pub(crate) fn insert(&mut self, entry: TaxonomyEntry) -> bool {
        if self.find_by_canonical(&entry.canonical_name).is_some() {
            return false;
        }
        self.entries.insert(entry.canonical_name.clone(), entry);
        true
    }

    /// Records a normalized alias; returns true when it was new.
    pub(crate) fn add_alias(&mut self, canonical_name: &str, phrase: &str) -> bool {
        let alias = normalize_phrase(phrase);
        if alias.is_empty() {
            return false;
        }
        match self.entries.get_mut(canonical_name) {
            Some(entry) => entry.aliases.insert(alias),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopicOrigin;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    #[test]
    fn test_insert_rejects_normalized_duplicates() {
        let mut taxonomy = Taxonomy::new("app");
        assert!(taxonomy.insert(TaxonomyEntry::discovered("Late Delivery", today())));
        assert!(!taxonomy.insert(TaxonomyEntry::discovered("late  delivery!", today())));
        assert_eq!(taxonomy.len(), 1);
    }

    #[test]
    fn test_from_entries_folds_collisions() {
        let mut second = TaxonomyEntry::discovered("LATE DELIVERY", today());
        second.aliases.insert("delivery delayed".into());
        let taxonomy = Taxonomy::from_entries(
            "app",
            vec![TaxonomyEntry::discovered("Late Delivery", today()), second],
        );

        assert_eq!(taxonomy.len(), 1);
        let entry = taxonomy.get("Late Delivery").unwrap();
        assert!(entry.aliases.contains("delivery delayed"));
        assert!(entry.aliases.contains("late delivery"));
        assert_eq!(
            taxonomy.folded(),
            &[("LATE DELIVERY".to_string(), "Late Delivery".to_string())]
        );
    }

    #[test]
    fn test_find_by_phrase_matches_aliases() {
        let taxonomy = Taxonomy::seeded("app", today());
        let entry = taxonomy.find_by_phrase("Late Delivery").unwrap();
        assert_eq!(entry.canonical_name, "Delivery/Service Delay");
        assert_eq!(entry.origin, TopicOrigin::Seed);
        assert!(taxonomy.find_by_phrase("delivery service delay").is_some());
        assert!(taxonomy.find_by_phrase("dark mode please").is_none());
    }

    #[test]
    fn test_add_alias_skips_known_phrases() {
        let mut taxonomy = Taxonomy::new("app");
        taxonomy.insert(TaxonomyEntry::discovered("Late Delivery", today()));

        assert!(taxonomy.add_alias("Late Delivery", "Delivery Delayed"));
        assert!(!taxonomy.add_alias("Late Delivery", "delivery delayed"));
        assert!(taxonomy.add_alias("Late Delivery", "late delivery"));
        assert!(!taxonomy.add_alias("Late Delivery", " ?! "));
        assert!(!taxonomy.add_alias("Unknown", "anything"));
    }
}
