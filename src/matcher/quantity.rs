//! Portion extraction (`"Brown rice (150g)"` → 150 g) and gram conversion.
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

static QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([A-Za-z]+)").unwrap());

/// Assumed portion, in grams, when a phrase carries no amount.
pub const DEFAULT_PORTION_GRAMS: f64 = 100.0;

/// Canonical unit token after spelling normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Gram,
    Milliliter,
    Cup,
    Tablespoon,
    Teaspoon,
    Ounce,
    Slice,
    Piece,
    Large,
    Medium,
    Small,
    /// Unit text that is not in the conversion table, kept lowercased.
    Other(String),
}

impl Unit {
    /// Normalize a unit spelling; unknown spellings become [`Unit::Other`].
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "g" | "gram" | "grams" => Self::Gram,
            "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
                Self::Milliliter
            }
            "cup" | "cups" => Self::Cup,
            "tbsp" | "tablespoon" | "tablespoons" => Self::Tablespoon,
            "tsp" | "teaspoon" | "teaspoons" => Self::Teaspoon,
            "oz" | "ounce" | "ounces" => Self::Ounce,
            "slice" | "slices" => Self::Slice,
            "piece" | "pieces" => Self::Piece,
            "large" => Self::Large,
            "medium" => Self::Medium,
            "small" => Self::Small,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Gram => "g",
            Self::Milliliter => "ml",
            Self::Cup => "cup",
            Self::Tablespoon => "tbsp",
            Self::Teaspoon => "tsp",
            Self::Ounce => "oz",
            Self::Slice => "slice",
            Self::Piece => "piece",
            Self::Large => "large",
            Self::Medium => "medium",
            Self::Small => "small",
            Self::Other(s) => s,
        }
    }

    /// Grams per one unit; `None` for units outside the table.
    ///
    /// Volumes assume a density of 1 g/ml.
    pub fn grams_per_unit(&self) -> Option<f64> {
        match self {
            Self::Gram | Self::Milliliter => Some(1.0),
            Self::Cup => Some(240.0),
            Self::Tablespoon => Some(15.0),
            Self::Teaspoon => Some(5.0),
            Self::Ounce => Some(28.35),
            Self::Slice => Some(30.0),
            Self::Piece => Some(100.0),
            Self::Large => Some(150.0),
            Self::Medium => Some(100.0),
            Self::Small => Some(50.0),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A query phrase split into its food name and portion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuantity {
    pub cleaned_name: String,
    pub amount: Option<f64>,
    pub unit: Option<Unit>,
}

/// Pull the first `<number><unit>` pair out of `phrase`.
///
/// The number may be loosely followed by the unit (`"2 cups"`). When no
/// pair is found the phrase is returned untouched with no amount.
pub fn extract_quantity(phrase: &str) -> ParsedQuantity {
    let found = QUANTITY.captures(phrase).and_then(|caps| {
        let whole = caps.get(0)?;
        let amount = caps[1].parse::<f64>().ok()?;
        Some((whole.range(), amount, Unit::parse(&caps[2])))
    });

    match found {
        Some((range, amount, unit)) => {
            let mut cleaned = String::with_capacity(phrase.len());
            cleaned.push_str(&phrase[..range.start]);
            cleaned.push_str(&phrase[range.end..]);
            ParsedQuantity {
                cleaned_name: cleaned.trim().to_string(),
                amount: Some(amount),
                unit: Some(unit),
            }
        }
        None => ParsedQuantity {
            cleaned_name: phrase.to_string(),
            amount: None,
            unit: None,
        },
    }
}

/// Convert a portion to grams.
///
/// A missing amount means a standard 100 g reference portion; a missing
/// unit with an amount is read as grams; unknown units pass the amount
/// through unchanged.
pub fn standardize_to_mass(amount: Option<f64>, unit: Option<&Unit>) -> f64 {
    let Some(amount) = amount else {
        return DEFAULT_PORTION_GRAMS;
    };
    unit.and_then(Unit::grams_per_unit)
        .map_or(amount, |factor| amount * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_grams() {
        let parsed = extract_quantity("Grilled chicken breast (200g)");
        assert_eq!(parsed.amount, Some(200.0));
        assert_eq!(parsed.unit, Some(Unit::Gram));
        assert_eq!(parsed.cleaned_name, "Grilled chicken breast ()");
    }

    #[test]
    fn test_extract_loose_unit_and_decimal() {
        let parsed = extract_quantity("Olive oil 1.5 Tablespoons");
        assert_eq!(parsed.amount, Some(1.5));
        assert_eq!(parsed.unit, Some(Unit::Tablespoon));
        assert_eq!(parsed.cleaned_name, "Olive oil");
    }

    #[test]
    fn test_extract_first_occurrence_only() {
        let parsed = extract_quantity("2 slices toast with 10g butter");
        assert_eq!(parsed.amount, Some(2.0));
        assert_eq!(parsed.unit, Some(Unit::Slice));
        assert_eq!(parsed.cleaned_name, "toast with 10g butter");
    }

    #[test]
    fn test_extract_unknown_unit() {
        let parsed = extract_quantity("3 dumplings");
        assert_eq!(parsed.amount, Some(3.0));
        assert_eq!(parsed.unit, Some(Unit::Other("dumplings".to_string())));
    }

    #[test]
    fn test_extract_none() {
        let parsed = extract_quantity("Mixed salad");
        assert_eq!(
            parsed,
            ParsedQuantity {
                cleaned_name: "Mixed salad".to_string(),
                amount: None,
                unit: None,
            }
        );
    }

    #[test]
    fn test_standardize_known_units() {
        let table = [
            (Unit::Gram, 1.0),
            (Unit::Milliliter, 1.0),
            (Unit::Cup, 240.0),
            (Unit::Tablespoon, 15.0),
            (Unit::Teaspoon, 5.0),
            (Unit::Ounce, 28.35),
            (Unit::Slice, 30.0),
            (Unit::Piece, 100.0),
            (Unit::Large, 150.0),
            (Unit::Medium, 100.0),
            (Unit::Small, 50.0),
        ];
        for amount in [0.5, 1.0, 2.0, 37.5] {
            for (unit, factor) in &table {
                assert_eq!(
                    standardize_to_mass(Some(amount), Some(unit)),
                    amount * factor,
                    "{amount} {unit}"
                );
            }
        }
    }

    #[test]
    fn test_standardize_defaults() {
        let other = Unit::Other("handful".to_string());
        assert_eq!(standardize_to_mass(Some(3.0), Some(&other)), 3.0);
        assert_eq!(standardize_to_mass(Some(42.0), None), 42.0);
        assert_eq!(standardize_to_mass(None, Some(&Unit::Cup)), 100.0);
        assert_eq!(standardize_to_mass(None, None), 100.0);
    }

    #[test]
    fn test_unit_serializes_as_token() {
        let json = serde_json::to_string(&Unit::Tablespoon).unwrap();
        assert_eq!(json, "\"tbsp\"");
    }
}
