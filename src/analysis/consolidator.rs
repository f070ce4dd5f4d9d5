use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::analysis::topic_mapper::{MapOutcome, TopicMapper};
use crate::error::Result;
use crate::llm::{LLMProvider, TopicValidationRequest};
use crate::models::{TaxonomyEntry, TopicAssignment, TopicVerdict, UnmappedPhrase, UnmappedReason};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::storage::Storage;
use crate::taxonomy::{normalize_phrase, Taxonomy};

/// Candidate phrases of one review, ready to be consolidated.
#[derive(Debug, Clone)]
pub struct ExtractedReview {
    pub review_id: String,
    pub posted_at: DateTime<Utc>,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub assignments: Vec<TopicAssignment>,
    pub new_topics: Vec<String>,
    pub aliases_added: usize,
    /// Clusters dropped for falling under the occurrence floor.
    pub dropped_clusters: usize,
    /// Cluster keys the validator turned down.
    pub rejected_topics: Vec<String>,
    /// Phrases of dropped or rejected clusters, per review.
    pub unmapped: Vec<UnmappedPhrase>,
}

/// New-candidate phrases grouped within a single run.
struct Cluster {
    members: Vec<String>,
    reviews: BTreeSet<usize>,
    mentions: BTreeSet<(usize, String)>,
}

impl Cluster {
    fn key(&self) -> &str {
        &self.members[0]
    }
}

/// Sole writer of the per-app taxonomy.
pub struct Consolidator {
    mapper: TopicMapper,
    min_occurrences: usize,
    seed_taxonomy: bool,
    validator: Option<Arc<dyn LLMProvider>>,
    retry: RetryPolicy,
}

impl Consolidator {
    pub fn new(mapper: TopicMapper, min_occurrences: usize, seed_taxonomy: bool) -> Self {
        Self {
            mapper,
            min_occurrences: min_occurrences.max(1),
            seed_taxonomy,
            validator: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Asks `llm` to approve every new topic before it is created.
    pub fn with_validator(mut self, llm: Arc<dyn LLMProvider>, retry: RetryPolicy) -> Self {
        self.validator = Some(llm);
        self.retry = retry;
        self
    }

    pub fn mapper(&self) -> &TopicMapper {
        &self.mapper
    }

    /// The stored taxonomy, or a fresh one (seeded unless disabled).
    pub fn load_or_seed(&self, storage: &Storage, app_id: &str, today: NaiveDate) -> Result<Taxonomy> {
        if let Some(taxonomy) = storage.load_taxonomy(app_id)? {
            tracing::info!("Loaded taxonomy for {} with {} topics", app_id, taxonomy.len());
            return Ok(taxonomy);
        }

        if self.seed_taxonomy {
            let taxonomy = Taxonomy::seeded(app_id, today);
            tracing::info!("Seeded taxonomy for {} with {} topics", app_id, taxonomy.len());
            Ok(taxonomy)
        } else {
            tracing::info!("Starting empty taxonomy for {}", app_id);
            Ok(Taxonomy::new(app_id))
        }
    }

    /// Maps every phrase, folds new candidates into the taxonomy and returns
    /// the resulting assignments. Nothing is persisted here.
    pub async fn consolidate(
        &self,
        taxonomy: &mut Taxonomy,
        reviews: &[ExtractedReview],
        today: NaiveDate,
    ) -> Consolidation {
        let mut result = Consolidation::default();
        let mut assigned: BTreeSet<(usize, String)> = BTreeSet::new();
        let mut unmapped: BTreeSet<(usize, String, UnmappedReason)> = BTreeSet::new();
        let mut pending: Vec<(usize, String)> = Vec::new();

        for (index, review) in reviews.iter().enumerate() {
            for phrase in &review.phrases {
                match self.mapper.map(phrase, taxonomy) {
                    MapOutcome::Existing { canonical_name, score } => {
                        tracing::debug!("'{}' -> '{}' ({:.2})", phrase, canonical_name, score);
                        if taxonomy.add_alias(&canonical_name, phrase) {
                            result.aliases_added += 1;
                        }
                        assigned.insert((index, canonical_name));
                    }
                    MapOutcome::NewCandidate { phrase } => pending.push((index, phrase)),
                }
            }
        }

        for cluster in self.cluster(pending) {
            if cluster.reviews.len() < self.min_occurrences {
                tracing::debug!(
                    "Dropping candidate '{}' seen in {} review(s)",
                    cluster.key(),
                    cluster.reviews.len()
                );
                result.dropped_clusters += 1;
                for (index, phrase) in &cluster.mentions {
                    unmapped.insert((*index, phrase.clone(), UnmappedReason::TooRare));
                }
                continue;
            }

            let canonical = title_case(cluster.key());
            let existing = taxonomy
                .find_by_canonical(&canonical)
                .map(|e| e.canonical_name.clone());
            let target = match existing {
                Some(existing) => existing,
                None => {
                    let verdict = self.judge(taxonomy, &cluster).await;
                    if !verdict.is_valid {
                        tracing::info!(
                            "Rejected candidate '{}': {}",
                            cluster.key(),
                            verdict.reasoning.as_deref().unwrap_or("no reason given")
                        );
                        result.rejected_topics.push(cluster.key().to_string());
                        for (index, phrase) in &cluster.mentions {
                            unmapped.insert((*index, phrase.clone(), UnmappedReason::Rejected));
                        }
                        continue;
                    }
                    self.promote(taxonomy, &cluster, canonical, verdict, today, &mut result)
                }
            };

            for member in &cluster.members {
                if taxonomy.add_alias(&target, member) {
                    result.aliases_added += 1;
                }
            }
            for index in &cluster.reviews {
                assigned.insert((*index, target.clone()));
            }
        }

        result.assignments = assigned
            .into_iter()
            .map(|(index, topic_name)| TopicAssignment {
                review_id: reviews[index].review_id.clone(),
                topic_name,
                posted_at: reviews[index].posted_at,
            })
            .collect();
        result.unmapped = unmapped
            .into_iter()
            .map(|(index, phrase, reason)| UnmappedPhrase {
                review_id: reviews[index].review_id.clone(),
                phrase,
                reason,
            })
            .collect();

        result
    }

    async fn judge(&self, taxonomy: &Taxonomy, cluster: &Cluster) -> TopicVerdict {
        let llm = match &self.validator {
            Some(llm) => llm.as_ref(),
            None => return TopicVerdict::accepted(),
        };

        let request = TopicValidationRequest {
            app_id: taxonomy.app_id().to_string(),
            phrase: cluster.key().to_string(),
            variants: cluster.members.clone(),
            mentions: cluster.reviews.len(),
            existing_topics: taxonomy.canonical_names(),
        };
        let result = retry_with_backoff(&self.retry, "validate topic", move || {
            llm.validate_topic(request.clone())
        })
        .await;

        match result {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!("Could not validate candidate '{}': {}", cluster.key(), e);
                TopicVerdict::rejected(format!("validation failed: {}", e))
            }
        }
    }

    /// Creates the entry for an approved cluster and returns its canonical
    /// name, which may be an existing entry if the suggested name collides.
    fn promote(
        &self,
        taxonomy: &mut Taxonomy,
        cluster: &Cluster,
        fallback_name: String,
        verdict: TopicVerdict,
        today: NaiveDate,
        result: &mut Consolidation,
    ) -> String {
        let name = verdict
            .suggested_name
            .filter(|n| !normalize_phrase(n).is_empty())
            .unwrap_or(fallback_name);

        if let Some(existing) = taxonomy.find_by_canonical(&name) {
            let existing = existing.canonical_name.clone();
            tracing::debug!("Merging candidate '{}' into '{}'", cluster.key(), existing);
            return existing;
        }

        let mut entry = TaxonomyEntry::discovered(name.clone(), today);
        entry.category = verdict.category.unwrap_or_default();
        entry.description = verdict.reasoning;
        taxonomy.insert(entry);
        tracing::info!("New topic '{}' ({} reviews)", name, cluster.reviews.len());
        result.new_topics.push(name.clone());
        name
    }

    /// Greedy single pass: each phrase joins the best-matching earlier
    /// cluster at or above the threshold, else starts its own.
    fn cluster(&self, pending: Vec<(usize, String)>) -> Vec<Cluster> {
        let scorer = self.mapper.scorer();
        let threshold = self.mapper.threshold();
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut by_phrase: HashMap<String, usize> = HashMap::new();

        for (review, phrase) in pending {
            let normalized = normalize_phrase(&phrase);
            if normalized.is_empty() {
                continue;
            }

            if let Some(&i) = by_phrase.get(&normalized) {
                clusters[i].reviews.insert(review);
                clusters[i].mentions.insert((review, normalized));
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for (i, cluster) in clusters.iter().enumerate() {
                let score = cluster
                    .members
                    .iter()
                    .map(|m| scorer.similarity(&normalized, m))
                    .fold(0.0, f64::max);
                if score < threshold {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((j, s)) => {
                        score > s || (score == s && cluster.key() < clusters[j].key())
                    }
                };
                if better {
                    best = Some((i, score));
                }
            }

            let index = match best {
                Some((i, _)) => {
                    clusters[i].members.push(normalized.clone());
                    clusters[i].reviews.insert(review);
                    i
                }
                None => {
                    clusters.push(Cluster {
                        members: vec![normalized.clone()],
                        reviews: BTreeSet::from([review]),
                        mentions: BTreeSet::new(),
                    });
                    clusters.len() - 1
                }
            };
            clusters[index].mentions.insert((review, normalized.clone()));
            by_phrase.insert(normalized, index);
        }

        clusters
    }
}

/// "late  delivery!" -> "Late Delivery"
pub fn title_case(phrase: &str) -> String {
    normalize_phrase(phrase)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
