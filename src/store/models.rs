use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier carried over from the source dataset (USDA `fdc_id` values
/// are numeric, hand-written fixtures often use strings).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FoodId {
    Number(i64),
    Text(String),
}

impl fmt::Display for FoodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One reference food with its nutrient profile per 100 reference units.
///
/// Nutrient keys follow the `"<nutrient-name> (<UNIT>)"` convention, e.g.
/// `"Energy (KCAL)"` or `"Total lipid (fat) (G)"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    #[serde(alias = "fdc_id")]
    pub id: FoodId,
    #[serde(default)]
    pub nutrients: HashMap<String, f64>,
}

/// Split a nutrient key into `(name, unit)`.
///
/// The unit is the content of the *last* parenthesized group, so
/// `"Total lipid (fat) (G)"` yields `("Total lipid (fat)", "G")`. Keys
/// without a unit suffix return an empty unit.
pub fn split_nutrient_key(key: &str) -> (&str, &str) {
    let trimmed = key.trim();
    if let Some(stripped) = trimmed.strip_suffix(')') {
        if let Some(open) = stripped.rfind('(') {
            let name = stripped[..open].trim_end();
            let unit = stripped[open + 1..].trim();
            if !name.is_empty() {
                return (name, unit);
            }
        }
    }
    (trimmed, "")
}

/// The four nutrients aggregated into meal totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedNutrient {
    Calories,
    Protein,
    Carbohydrates,
    Fat,
}

impl TrackedNutrient {
    /// Classify a nutrient key, if it is one of the tracked ones.
    pub fn classify(key: &str) -> Option<Self> {
        let (name, unit) = split_nutrient_key(key);
        if name.contains("Energy") {
            return unit.eq_ignore_ascii_case("KCAL").then_some(Self::Calories);
        }
        if name.contains("Total lipid (fat)") {
            return Some(Self::Fat);
        }
        if name.starts_with("Protein") {
            return Some(Self::Protein);
        }
        if name.starts_with("Carbohydrate") {
            return Some(Self::Carbohydrates);
        }
        None
    }
}

impl FoodItem {
    /// Amount of `nutrient` per 100 reference units.
    ///
    /// USDA rows occasionally carry two carbohydrate variants; only the
    /// first one in key order is used so the value is not doubled.
    pub fn tracked_value(&self, nutrient: TrackedNutrient) -> Option<f64> {
        let mut keys: Vec<&String> = self.nutrients.keys().collect();
        keys.sort();
        keys.into_iter()
            .find(|k| TrackedNutrient::classify(k) == Some(nutrient))
            .and_then(|k| self.nutrients.get(k).copied())
    }
}
