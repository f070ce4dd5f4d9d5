use std::sync::Arc;

use crate::models::TaxonomyEntry;
use crate::taxonomy::{normalize_phrase, SimilarityScorer, Taxonomy};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Existing { canonical_name: String, score: f64 },
    NewCandidate { phrase: String },
}

/// Matches raw phrases against a taxonomy by similarity.
#[derive(Clone)]
pub struct TopicMapper {
    scorer: Arc<dyn SimilarityScorer>,
    threshold: f64,
}

impl TopicMapper {
    pub fn new(scorer: Arc<dyn SimilarityScorer>, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> &dyn SimilarityScorer {
        self.scorer.as_ref()
    }

    /// Best score of `phrase` against the entry's canonical name and aliases.
    pub fn entry_similarity(&self, phrase: &str, entry: &TaxonomyEntry) -> f64 {
        let wanted = normalize_phrase(phrase);
        if entry.aliases.contains(&wanted) {
            return 1.0;
        }

        entry
            .aliases
            .iter()
            .map(|alias| self.scorer.similarity(phrase, alias))
            .fold(self.scorer.similarity(phrase, &entry.canonical_name), f64::max)
    }

    pub fn map(&self, phrase: &str, taxonomy: &Taxonomy) -> MapOutcome {
        let mut best: Option<(&str, f64)> = None;

        // Entries iterate in name order, so a strict `>` keeps the smaller
        // name on ties.
        for entry in taxonomy.entries() {
            let score = self.entry_similarity(phrase, entry);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry.canonical_name.as_str(), score));
            }
        }

        match best {
            Some((name, score)) if score >= self.threshold => MapOutcome::Existing {
                canonical_name: name.to_string(),
                score,
            },
            _ => MapOutcome::NewCandidate {
                phrase: phrase.trim().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{TokenScorer, TrigramScorer};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn mapper() -> TopicMapper {
        TopicMapper::new(Arc::new(TrigramScorer), DEFAULT_SIMILARITY_THRESHOLD)
    }

    #[test]
    fn test_maps_seed_alias_exactly() {
        let taxonomy = Taxonomy::seeded("app", today());
        assert_eq!(
            mapper().map("Late delivery!", &taxonomy),
            MapOutcome::Existing {
                canonical_name: "Delivery/Service Delay".into(),
                score: 1.0
            }
        );
    }

    #[test]
    fn test_maps_near_synonym_of_alias() {
        let mut taxonomy = Taxonomy::new("app");
        taxonomy.insert(TaxonomyEntry::discovered("Late Delivery", today()));
        taxonomy.add_alias("Late Delivery", "late delivery");

        match mapper().map("delivery delayed", &taxonomy) {
            MapOutcome::Existing { canonical_name, score } => {
                assert_eq!(canonical_name, "Late Delivery");
                assert!(score >= 0.6 && score < 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unrelated_phrase_is_new_candidate() {
        let taxonomy = Taxonomy::seeded("app", today());
        assert_eq!(
            mapper().map("  dark mode for night reading ", &taxonomy),
            MapOutcome::NewCandidate {
                phrase: "dark mode for night reading".into()
            }
        );
        assert!(matches!(
            mapper().map("anything", &Taxonomy::new("app")),
            MapOutcome::NewCandidate { .. }
        ));
    }

    #[test]
    fn test_ties_go_to_smaller_canonical_name() {
        let mut taxonomy = Taxonomy::new("app");
        for name in ["Zeta Refund", "Alpha Refund"] {
            let mut entry = TaxonomyEntry::discovered(name, today());
            entry.aliases.insert("refund pending".into());
            taxonomy.insert(entry);
        }

        let mapper = TopicMapper::new(Arc::new(TokenScorer), 0.6);
        assert_eq!(
            mapper.map("refund pending", &taxonomy),
            MapOutcome::Existing {
                canonical_name: "Alpha Refund".into(),
                score: 1.0
            }
        );
    }
}
