//! Ordered match strategies tried by [`NutritionMatcher`](super::NutritionMatcher).
use std::collections::HashSet;

use super::MatchConfig;
use super::text::{self, TextRules};

/// Store names prepared once for repeated comparisons.
#[derive(Debug)]
pub struct IndexedName {
    pub processed: String,
    pub words: HashSet<String>,
}

/// A preprocessed query.
#[derive(Debug)]
pub struct Query<'q> {
    pub processed: &'q str,
    pub words: HashSet<String>,
}

/// Best candidate a strategy found: store index and raw (uncapped) score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub score: f64,
}

/// A single way of picking a store entry for a query.
///
/// Strategies are tried in order; the first candidate reaching the
/// threshold wins. A strategy may return a sub-threshold candidate, which
/// is kept as a best-effort fallback.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn find(
        &self,
        query: &Query<'_>,
        names: &[IndexedName],
        rules: &TextRules,
        config: &MatchConfig,
    ) -> Option<Candidate>;
}

fn keep_best(best: &mut Option<Candidate>, index: usize, score: f64) {
    if best.is_none_or(|b| score > b.score) {
        *best = Some(Candidate { index, score });
    }
}

/// Restricts the pool to names containing the query's synonym base word,
/// scoring with the max similarity plus a bonus.
#[derive(Debug, Default)]
pub struct SynonymAnchored;

impl MatchStrategy for SynonymAnchored {
    fn name(&self) -> &'static str {
        "synonym"
    }

    fn find(
        &self,
        query: &Query<'_>,
        names: &[IndexedName],
        rules: &TextRules,
        config: &MatchConfig,
    ) -> Option<Candidate> {
        let base = rules.match_base_word(query.processed)?;
        let mut best = None;
        for (index, name) in names.iter().enumerate() {
            if !name.processed.contains(base) {
                continue;
            }
            let score = text::similarity(query.processed, &name.processed) + config.base_word_bonus;
            keep_best(&mut best, index, score);
        }
        best
    }
}

/// Scans the whole store with the weighted blend and only reports a
/// candidate at or above the threshold.
#[derive(Debug, Default)]
pub struct GeneralWeighted;

impl MatchStrategy for GeneralWeighted {
    fn name(&self) -> &'static str {
        "general"
    }

    fn find(
        &self,
        query: &Query<'_>,
        names: &[IndexedName],
        _rules: &TextRules,
        config: &MatchConfig,
    ) -> Option<Candidate> {
        let mut best = None;
        for (index, name) in names.iter().enumerate() {
            let mut score = text::weighted_similarity(query.processed, &name.processed);
            if !query.words.is_empty() && query.words.is_subset(&name.words) {
                score += config.subset_bonus;
            }
            if score >= config.threshold {
                keep_best(&mut best, index, score);
            }
        }
        best
    }
}

/// The default chain: synonym-anchored first, then the general pool.
pub fn default_chain() -> Vec<Box<dyn MatchStrategy>> {
    vec![Box::new(SynonymAnchored), Box::new(GeneralWeighted)]
}
