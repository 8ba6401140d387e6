//! Fuzzy resolution of free-text food phrases against the nutrient store.
//!
//! - [`text`]: preprocessing, synonym lookup and similarity ratios
//! - [`quantity`]: portion extraction and gram conversion
//! - [`strategy`]: the ordered match strategies
//! - [`core`]: [`NutritionMatcher`], tying the above to a [`NutrientStore`](crate::store::NutrientStore)
pub mod core;
pub mod quantity;
pub mod strategy;
pub mod text;

use serde::{Deserialize, Serialize};

use crate::store::FoodItem;
pub use self::core::NutritionMatcher;
pub use quantity::Unit;

fn default_threshold() -> f64 {
    60.0
}

fn default_base_word_bonus() -> f64 {
    20.0
}

fn default_subset_bonus() -> f64 {
    15.0
}

fn default_suggestion_margin() -> f64 {
    20.0
}

fn default_max_suggestions() -> usize {
    3
}

/// Tunables for matching. The bonuses are empirical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum score for a general-pool match.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Added to synonym-anchored candidates.
    #[serde(default = "default_base_word_bonus")]
    pub base_word_bonus: f64,

    /// Added when every query word appears in the candidate.
    #[serde(default = "default_subset_bonus")]
    pub subset_bonus: f64,

    /// Near misses scoring above `threshold - suggestion_margin` are suggested.
    #[serde(default = "default_suggestion_margin")]
    pub suggestion_margin: f64,

    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            base_word_bonus: default_base_word_bonus(),
            subset_bonus: default_subset_bonus(),
            suggestion_margin: default_suggestion_margin(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

impl MatchConfig {
    pub fn suggestion_cutoff(&self) -> f64 {
        self.threshold - self.suggestion_margin
    }
}

/// A resolved query phrase, borrowing the matched store item.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub item: &'a FoodItem,
    /// Heuristic score in `0..=100`.
    pub confidence: f64,
    pub amount: Option<f64>,
    pub unit: Option<Unit>,
    /// Name of the strategy that produced the match.
    pub strategy: &'static str,
}

/// A near miss reported for an unmatched phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a> {
    Matched(MatchResult<'a>),
    Unmatched { suggestions: Vec<Suggestion> },
}

impl<'a> MatchOutcome<'a> {
    pub fn matched(&self) -> Option<&MatchResult<'a>> {
        match self {
            Self::Matched(m) => Some(m),
            Self::Unmatched { .. } => None,
        }
    }
}

/// Calories (kcal) and macronutrients (g).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
}

impl NutrientTotals {
    pub fn add_scaled(&mut self, other: &NutrientTotals, factor: f64) {
        self.calories += other.calories * factor;
        self.protein += other.protein * factor;
        self.carbohydrates += other.carbohydrates * factor;
        self.fat += other.fat * factor;
    }

    /// Round every field to one decimal place.
    pub fn rounded(self) -> Self {
        Self {
            calories: round1(self.calories),
            protein: round1(self.protein),
            carbohydrates: round1(self.carbohydrates),
            fat: round1(self.fat),
        }
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// One matched phrase as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodMatch {
    pub query: String,
    pub matched_name: String,
    pub food_id: String,
    pub confidence: f64,
    pub amount: Option<f64>,
    pub unit: Option<Unit>,
    /// Portion after conversion to grams.
    pub grams: f64,
    /// This item's scaled contribution to the meal totals.
    pub nutrients: NutrientTotals,
}

/// Near misses for one unmatched phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedSuggestions {
    pub query: String,
    pub suggestions: Vec<Suggestion>,
}

/// Database-backed estimate for a whole meal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealAnalysis {
    pub matched_items: Vec<FoodMatch>,
    pub unmatched_items: Vec<String>,
    pub suggestions: Vec<UnmatchedSuggestions>,
    pub totals: NutrientTotals,
    /// Sum of match confidences divided by the number of phrases.
    pub confidence_score: f64,
}
