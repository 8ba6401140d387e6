/// Extraction of nutrition fields and itemized lists from a model reply.
///
/// The reply follows the textual contract laid down in
/// [`SYSTEM_PROMPT`](crate::inference::prompt::SYSTEM_PROMPT):
///
/// ```text
/// CALORIES: 450
/// Carbohydrates: 45g
/// Protein: 25g
/// Fat: 20g
/// Fiber: 8g
///
/// Food Items:
/// - Greek yogurt (150g)
///
/// Plant-based Ingredients:
/// - Blueberries
/// ```
///
/// Nothing here fails: missing or garbled fields come back as `None` or an
/// empty list.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static CALORIES_ANCHORED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CALORIES:\s*(\d+)").unwrap());
static CALORIES_ANYWHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CALORIES:\s*(\d+)").unwrap());
static CARBOHYDRATES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Carbohydrates:\s*(\d+)g").unwrap());
static PROTEIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Protein:\s*(\d+)g").unwrap());
static FAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Fat:\s*(\d+)g").unwrap());
static FIBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)Fiber[:\s]*([\d.]+)g|Fibre[:\s]*([\d.]+)g|Dietary fiber[:\s]*([\d.]+)g",
    )
    .unwrap()
});
static FOOD_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Food Items:\s*((?:[ \t]*- [^\n]+\n?)+)").unwrap());
static PLANT_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Plant-based Ingredients:\s*((?:[ \t]*- [^\n]+\n?)+)").unwrap()
});
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"- ([^\n]+)").unwrap());

/// Totals reported by the model. Absent fields were not found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFields {
    pub calories: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub fiber: Option<f64>,
}

impl NutritionFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parses a model reply. Swappable so the reply format can change without
/// touching the matcher.
pub trait ReplyParser: Send + Sync {
    fn extract_nutrition(&self, text: &str) -> NutritionFields;

    fn extract_food_items(&self, text: &str) -> Vec<String>;

    fn extract_plant_items(&self, text: &str) -> Vec<String>;
}

/// Parser for the line-oriented reply contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextContractParser;

impl ReplyParser for TextContractParser {
    fn extract_nutrition(&self, text: &str) -> NutritionFields {
        extract_nutrition(text)
    }

    fn extract_food_items(&self, text: &str) -> Vec<String> {
        extract_food_items(text)
    }

    fn extract_plant_items(&self, text: &str) -> Vec<String> {
        extract_plant_items(text)
    }
}

fn first_number(re: &Regex, text: &str, field: &str) -> Option<f64> {
    let caps = re.captures(text)?;
    let raw = caps.iter().skip(1).flatten().next()?.as_str();
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Unparseable {field} value {raw:?}: {e}");
            None
        }
    }
}

/// Pull the five totals out of `text`.
pub fn extract_nutrition(text: &str) -> NutritionFields {
    let calories = first_number(&CALORIES_ANCHORED, text.trim(), "calories")
        .or_else(|| first_number(&CALORIES_ANYWHERE, text, "calories"));

    let fields = NutritionFields {
        calories,
        carbohydrates: first_number(&CARBOHYDRATES, text, "carbohydrates"),
        protein: first_number(&PROTEIN, text, "protein"),
        fat: first_number(&FAT, text, "fat"),
        fiber: first_number(&FIBER, text, "fiber"),
    };

    if fields.is_empty() {
        warn!("Reply does not follow the nutrition format; no fields extracted");
    } else if fields.calories.is_none() {
        debug!("Reply has no CALORIES line");
    }
    fields
}

fn extract_section(re: &Regex, text: &str) -> Vec<String> {
    let Some(section) = re.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    BULLET
        .captures_iter(section.as_str())
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Bulleted entries under `Food Items:`; empty when the section is missing.
pub fn extract_food_items(text: &str) -> Vec<String> {
    let items = extract_section(&FOOD_SECTION, text);
    if items.is_empty() {
        debug!("No Food Items section in reply");
    }
    items
}

/// Bulleted entries under `Plant-based Ingredients:`.
pub fn extract_plant_items(text: &str) -> Vec<String> {
    extract_section(&PLANT_SECTION, text)
}

/// Number of distinct plants, ignoring case.
pub fn unique_plant_count(plants: &[String]) -> usize {
    plants
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect::<HashSet<_>>()
        .len()
}
