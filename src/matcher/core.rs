use std::sync::Arc;

use tracing::debug;

use super::quantity::{extract_quantity, standardize_to_mass};
use super::strategy::{self, Candidate, IndexedName, MatchStrategy, Query};
use super::text::{self, TextRules};
use super::{
    FoodMatch, MatchConfig, MatchOutcome, MatchResult, MealAnalysis, NutrientTotals, Suggestion,
    UnmatchedSuggestions, round1,
};
use crate::store::{FoodItem, NutrientStore, TrackedNutrient};

/// Resolves food phrases against a shared, read-only [`NutrientStore`].
///
/// Holds no mutable state, so one instance can serve concurrent callers.
pub struct NutritionMatcher {
    store: Arc<NutrientStore>,
    names: Vec<IndexedName>,
    rules: TextRules,
    config: MatchConfig,
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl NutritionMatcher {
    pub fn new(store: Arc<NutrientStore>, rules: TextRules, config: MatchConfig) -> Self {
        Self::with_strategies(store, rules, config, strategy::default_chain())
    }

    pub fn with_strategies(
        store: Arc<NutrientStore>,
        rules: TextRules,
        config: MatchConfig,
        strategies: Vec<Box<dyn MatchStrategy>>,
    ) -> Self {
        let names = store
            .all_items()
            .iter()
            .map(|item| {
                let processed = rules.preprocess(&item.name);
                let words = text::tokens(&processed).into_iter().collect();
                IndexedName { processed, words }
            })
            .collect();

        Self {
            store,
            names,
            rules,
            config,
            strategies,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Resolve one phrase to its best store entry.
    pub fn find_best_match(&self, phrase: &str) -> MatchOutcome<'_> {
        let parsed = extract_quantity(phrase);
        let processed = self.rules.preprocess(&parsed.cleaned_name);

        if !processed.is_empty() {
            let query = Query {
                processed: &processed,
                words: text::tokens(&processed).into_iter().collect(),
            };

            if let Some((candidate, strategy)) = self.run_chain(&query) {
                let item = &self.store.all_items()[candidate.index];
                debug!(
                    "Matched {phrase:?} -> {:?} ({strategy}, score {:.1})",
                    item.name, candidate.score
                );
                return MatchOutcome::Matched(MatchResult {
                    item,
                    confidence: candidate.score.min(100.0),
                    amount: parsed.amount,
                    unit: parsed.unit,
                    strategy,
                });
            }
        }

        debug!("No match for {phrase:?}");
        MatchOutcome::Unmatched {
            suggestions: self.suggest(phrase),
        }
    }

    /// Try strategies in order, stopping at the first qualifying candidate.
    /// Falls back to the first sub-threshold candidate any strategy offered.
    fn run_chain(&self, query: &Query<'_>) -> Option<(Candidate, &'static str)> {
        let mut fallback = None;
        for strategy in &self.strategies {
            let Some(candidate) = strategy.find(query, &self.names, &self.rules, &self.config)
            else {
                continue;
            };
            if candidate.score >= self.config.threshold {
                return Some((candidate, strategy.name()));
            }
            fallback.get_or_insert((candidate, strategy.name()));
        }
        fallback
    }

    /// Store names resembling the raw phrase, best first.
    pub fn suggest(&self, phrase: &str) -> Vec<Suggestion> {
        let raw = phrase.to_lowercase();
        let cutoff = self.config.suggestion_cutoff();

        let mut scored: Vec<Suggestion> = self
            .store
            .lowercase_names()
            .iter()
            .zip(self.store.all_items())
            .filter_map(|(lower, item)| {
                let score = text::similarity(&raw, lower);
                (score > cutoff).then(|| Suggestion {
                    name: item.name.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.config.max_suggestions);
        scored
    }

    /// Build the database-backed estimate for a list of phrases.
    pub fn analyze_meal<S: AsRef<str>>(&self, phrases: &[S]) -> MealAnalysis {
        let mut analysis = MealAnalysis::default();
        let mut raw_totals = NutrientTotals::default();
        let mut confidence_sum = 0.0;

        for phrase in phrases {
            let phrase = phrase.as_ref();
            match self.find_best_match(phrase) {
                MatchOutcome::Matched(m) => {
                    let grams = standardize_to_mass(m.amount, m.unit.as_ref());
                    let per_100 = per_100_profile(m.item);
                    let mut contribution = NutrientTotals::default();
                    contribution.add_scaled(&per_100, grams / 100.0);
                    raw_totals.add_scaled(&contribution, 1.0);
                    confidence_sum += m.confidence;

                    analysis.matched_items.push(FoodMatch {
                        query: phrase.to_string(),
                        matched_name: m.item.name.clone(),
                        food_id: m.item.id.to_string(),
                        confidence: m.confidence,
                        amount: m.amount,
                        unit: m.unit,
                        grams,
                        nutrients: contribution.rounded(),
                    });
                }
                MatchOutcome::Unmatched { suggestions } => {
                    analysis.unmatched_items.push(phrase.to_string());
                    analysis.suggestions.push(UnmatchedSuggestions {
                        query: phrase.to_string(),
                        suggestions,
                    });
                }
            }
        }

        analysis.totals = raw_totals.rounded();
        analysis.confidence_score = if phrases.is_empty() {
            0.0
        } else {
            round1(confidence_sum / phrases.len() as f64)
        };
        analysis
    }
}

fn per_100_profile(item: &FoodItem) -> NutrientTotals {
    let value = |n| item.tracked_value(n).unwrap_or(0.0);
    NutrientTotals {
        calories: value(TrackedNutrient::Calories),
        protein: value(TrackedNutrient::Protein),
        carbohydrates: value(TrackedNutrient::Carbohydrates),
        fat: value(TrackedNutrient::Fat),
    }
}
