//! String preprocessing and fuzzy similarity primitives.
//!
//! All ratios are Indel-distance based (`2 * LCS / (|a| + |b|)`) and scaled
//! to `0..=100`, computed over `char`s so non-ASCII names are safe.
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Words removed from food names before comparison.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "fresh",
    "raw",
    "cooked",
    "prepared",
    "unprepared",
    "frozen",
    "canned",
];

/// Common foods and the phrasings a model tends to use for them.
pub const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "chicken",
        &["chicken", "chicken breast", "chicken thigh", "chicken meat"],
    ),
    ("bacon", &["bacon", "bacon strips", "streaky bacon", "back bacon"]),
    ("beef", &["beef", "steak", "ground beef", "beef patty"]),
    ("pork", &["pork", "pork chop", "pork loin", "ham"]),
    ("salmon", &["salmon", "salmon fillet", "smoked salmon"]),
    ("egg", &["egg", "eggs", "scrambled egg", "fried egg"]),
    ("rice", &["rice", "white rice", "brown rice", "fried rice"]),
    ("bread", &["bread", "toast", "bun", "baguette"]),
    ("pasta", &["pasta", "spaghetti", "penne", "macaroni"]),
    ("potato", &["potato", "potatoes", "fries", "mashed potato"]),
    ("cheese", &["cheese", "cheddar", "mozzarella", "parmesan"]),
    ("milk", &["milk", "whole milk", "skim milk"]),
    ("yogurt", &["yogurt", "yoghurt", "greek yogurt"]),
    ("tomato", &["tomato", "tomatoes", "cherry tomato"]),
    ("avocado", &["avocado", "avocados", "guacamole"]),
];

static PARENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// A synonym group: `key` is the base word searched for in reference names.
#[derive(Debug, Clone, PartialEq)]
pub struct SynonymGroup {
    pub key: String,
    pub variants: Vec<String>,
}

/// Static text configuration injected into the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRules {
    pub stop_words: Vec<String>,
    pub synonyms: Vec<SynonymGroup>,
}

impl Default for TextRules {
    fn default() -> Self {
        Self {
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            synonyms: DEFAULT_SYNONYMS
                .iter()
                .map(|(key, variants)| SynonymGroup {
                    key: key.to_string(),
                    variants: variants.iter().map(|v| v.to_string()).collect(),
                })
                .collect(),
        }
    }
}

impl TextRules {
    /// Normalize a food name for comparison.
    ///
    /// Lowercases, strips parenthesized content, removes every stop word
    /// (as a substring, repeated until nothing changes) and collapses
    /// whitespace. The result is a fixed point: preprocessing it again
    /// returns it unchanged.
    pub fn preprocess(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        let mut text = PARENS.replace_all(&lowered, " ").into_owned();

        loop {
            let before = text.len();
            for word in &self.stop_words {
                if !word.is_empty() {
                    text = text.replace(word.as_str(), "");
                }
            }
            if text.len() == before {
                break;
            }
        }

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Key of the first synonym group with a variant contained in `name`.
    pub fn match_base_word(&self, name: &str) -> Option<&str> {
        self.synonyms
            .iter()
            .find(|g| g.variants.iter().any(|v| name.contains(v.as_str())))
            .map(|g| g.key.as_str())
    }
}

/// Split into lowercase alphanumeric tokens.
pub fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn char_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Plain character similarity.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    char_ratio(&a, &b)
}

/// Best [`ratio`] of the shorter string against every equally long window
/// of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }

    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let score = char_ratio(&short, window);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

/// [`ratio`] after sorting each side's tokens alphabetically.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let mut ta = tokens(a);
    let mut tb = tokens(b);
    ta.sort();
    tb.sort();
    ratio(&ta.join(" "), &tb.join(" "))
}

/// Set-based token overlap similarity.
///
/// Compares the shared tokens against each side's shared-plus-remaining
/// tokens, so a name that merely adds words to the other scores high.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let sa: BTreeSet<String> = tokens(a).into_iter().collect();
    let sb: BTreeSet<String> = tokens(b).into_iter().collect();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }

    fn join<'a>(it: impl Iterator<Item = &'a String>) -> String {
        it.map(String::as_str).collect::<Vec<_>>().join(" ")
    }
    let sect = join(sa.intersection(&sb));
    let diff_ab = join(sa.difference(&sb));
    let diff_ba = join(sb.difference(&sa));

    let combined_ab = format!("{sect} {diff_ab}").trim().to_string();
    let combined_ba = format!("{sect} {diff_ba}").trim().to_string();

    ratio(&sect, &combined_ab)
        .max(ratio(&sect, &combined_ba))
        .max(ratio(&combined_ab, &combined_ba))
}

/// Maximum of the four similarity measures.
pub fn similarity(a: &str, b: &str) -> f64 {
    ratio(a, b)
        .max(partial_ratio(a, b))
        .max(token_sort_ratio(a, b))
        .max(token_set_ratio(a, b))
}

/// Blended score used for the unfiltered candidate pool.
pub fn weighted_similarity(a: &str, b: &str) -> f64 {
    0.3 * ratio(a, b)
        + 0.3 * partial_ratio(a, b)
        + 0.2 * token_sort_ratio(a, b)
        + 0.2 * token_set_ratio(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_basic() {
        let rules = TextRules::default();
        assert_eq!(
            rules.preprocess("Fresh  Spinach (Raw) leaves"),
            "spinach leaves"
        );
        assert_eq!(rules.preprocess("Rice, brown, cooked"), "rice, brown,");
    }

    #[test]
    fn test_preprocess_idempotent() {
        let rules = TextRules::default();
        let inputs = [
            "Grilled chicken breast (200g)",
            "frawesh peas",
            "((nested)) canned   tuna",
            "Strawberries, RAW",
            "   ",
            "Pâté (fresh)",
        ];
        for input in inputs {
            let once = rules.preprocess(input);
            assert_eq!(rules.preprocess(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_match_base_word() {
        let rules = TextRules::default();
        assert_eq!(rules.match_base_word("crispy bacon strips"), Some("bacon"));
        assert_eq!(rules.match_base_word("buttered toast"), Some("bread"));
        assert_eq!(rules.match_base_word("quinoa salad"), None);
    }

    #[test]
    fn test_match_base_word_custom_table() {
        let rules = TextRules {
            stop_words: vec![],
            synonyms: vec![SynonymGroup {
                key: "tofu".to_string(),
                variants: vec!["bean curd".to_string()],
            }],
        };
        assert_eq!(rules.match_base_word("fried bean curd"), Some("tofu"));
        assert_eq!(rules.match_base_word("chicken"), None);
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio("apple", "apple"), 100.0);
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
        // LCS("kitten", "sitting") = 4 -> 2*4 / 13
        assert!((ratio("kitten", "sitting") - 800.0 / 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_ratio() {
        assert_eq!(partial_ratio("chicken", "grilled chicken breast"), 100.0);
        assert_eq!(partial_ratio("", "abc"), 0.0);
    }

    #[test]
    fn test_token_ratios() {
        assert_eq!(
            token_sort_ratio("chicken breast grilled", "grilled chicken breast"),
            100.0
        );
        assert_eq!(
            token_set_ratio("chicken breast", "chicken breast, grilled"),
            100.0
        );
        assert_eq!(token_set_ratio("", "chicken"), 0.0);
    }

    #[test]
    fn test_similarity_bounds() {
        let pairs = [("rice", "brown rice"), ("x", "completely different"), ("", "")];
        for (a, b) in pairs {
            let s = similarity(a, b);
            let w = weighted_similarity(a, b);
            assert!((0.0..=100.0).contains(&s));
            assert!((0.0..=100.0).contains(&w));
            assert!(w <= s + 1e-9);
        }
    }
}
