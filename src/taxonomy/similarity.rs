use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "be", "for", "in", "is", "it", "my", "of", "on", "so", "the",
    "this", "to", "very", "was", "were", "with",
];

/// Scores how alike two topic phrases are, in `[0, 1]`.
pub trait SimilarityScorer: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
    fn name(&self) -> &str;
}

/// NFKC-folds, lowercases, turns punctuation into spaces and collapses
/// whitespace.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .nfkc()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn content_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Dice coefficient over per-token character trigrams.
///
/// Shared word stems dominate the score, so "late delivery" and
/// "delivery delayed" land close while "wrong order" and "order delayed"
/// do not.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrigramScorer;

impl TrigramScorer {
    fn grams(normalized: &str) -> BTreeSet<String> {
        let mut grams = BTreeSet::new();
        for token in content_tokens(normalized) {
            let chars: Vec<char> = token.chars().collect();
            if chars.len() < 3 {
                grams.insert(token.to_string());
                continue;
            }
            for window in chars.windows(3) {
                grams.insert(window.iter().collect());
            }
        }
        grams
    }
}

impl SimilarityScorer for TrigramScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (normalize_phrase(a), normalize_phrase(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        let (ga, gb) = (Self::grams(&a), Self::grams(&b));
        let total = ga.len() + gb.len();
        if total == 0 {
            return 0.0;
        }
        2.0 * ga.intersection(&gb).count() as f64 / total as f64
    }

    fn name(&self) -> &str {
        "trigram"
    }
}

/// Jaccard overlap of content words.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenScorer;

impl SimilarityScorer for TokenScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (normalize_phrase(a), normalize_phrase(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        let ta: BTreeSet<String> = content_tokens(&a).into_iter().map(String::from).collect();
        let tb: BTreeSet<String> = content_tokens(&b).into_iter().map(String::from).collect();
        jaccard(&ta, &tb)
    }

    fn name(&self) -> &str {
        "token"
    }
}

/// Jaro-Winkler edit similarity over the whole normalized phrase. Favors
/// shared prefixes, so it suits inflected variants ("crash", "crashes")
/// more than reordered words.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerScorer;

impl SimilarityScorer for JaroWinklerScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (normalize_phrase(a), normalize_phrase(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        strsim::jaro_winkler(&a, &b).clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "jaro_winkler"
    }
}

pub fn scorer_by_name(name: &str) -> Option<Box<dyn SimilarityScorer>> {
    match name.to_lowercase().as_str() {
        "trigram" => Some(Box::new(TrigramScorer)),
        "token" | "jaccard" => Some(Box::new(TokenScorer)),
        "jaro_winkler" | "jaro-winkler" | "jarowinkler" => Some(Box::new(JaroWinklerScorer)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phrase() {
        assert_eq!(normalize_phrase("  Delivery/Service   Delay "), "delivery service delay");
        assert_eq!(normalize_phrase("App CRASHED!!"), "app crashed");
        assert_eq!(normalize_phrase(" \t "), "");
        // full-width letters and ligatures fold to their plain forms
        assert_eq!(normalize_phrase("ＬＡＴＥ delivery"), "late delivery");
        assert_eq!(normalize_phrase("please \u{fb01}x"), "please fix");
    }

    #[test]
    fn test_trigram_scores_near_synonyms_above_default_threshold() {
        let scorer = TrigramScorer;
        let score = scorer.similarity("late delivery", "delivery delayed");
        assert!(score > 0.6, "score was {}", score);
        assert!(scorer.similarity("app crash", "App crashes") > 0.75);
    }

    #[test]
    fn test_trigram_keeps_unrelated_phrases_apart() {
        let scorer = TrigramScorer;
        assert!(scorer.similarity("wrong order", "order delayed") < 0.6);
        assert!(scorer.similarity("payment failed", "login failed") < 0.6);
        assert_eq!(scorer.similarity("refund pending", "   "), 0.0);
    }

    #[test]
    fn test_scores_are_symmetric_and_bounded() {
        let pairs = [
            ("late delivery", "delivery delayed"),
            ("hidden charges", "extra charges"),
            ("x", "y"),
        ];
        for scorer in [scorer_by_name("trigram").unwrap(), scorer_by_name("token").unwrap()] {
            for (a, b) in pairs {
                let ab = scorer.similarity(a, b);
                assert_eq!(ab, scorer.similarity(b, a));
                assert!((0.0..=1.0).contains(&ab));
            }
            assert_eq!(scorer.similarity("Late  Delivery", "late delivery"), 1.0);
        }
    }

    #[test]
    fn test_jaro_winkler_scorer() {
        let scorer = scorer_by_name("Jaro-Winkler").unwrap();
        assert_eq!(scorer.name(), "jaro_winkler");

        assert!(scorer.similarity("app crash", "App crashes!") > 0.9);
        assert!(scorer.similarity("late delivery", "refund pending") < 0.6);
        assert_eq!(scorer.similarity("Late  Delivery", "late delivery"), 1.0);
        assert_eq!(scorer.similarity("late delivery", ""), 0.0);

        let score = scorer.similarity("hidden charges", "extra charges");
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_token_scorer_ignores_stopwords() {
        let scorer = TokenScorer;
        assert_eq!(scorer.similarity("the app is slow", "slow app"), 1.0);
    }
}
