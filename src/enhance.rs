//! Combines the model's own totals with the database-backed estimate.
//!
//! The two estimates are reported side by side; nothing here tries to
//! reconcile them into one number.
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::inference::{InferenceClient, InferenceResult};
use crate::matcher::{FoodMatch, NutrientTotals, NutritionMatcher, UnmatchedSuggestions};
use crate::response::{NutritionFields, ReplyParser, unique_plant_count};

/// Model estimate plus, when matching ran, the database estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnhancedEstimate {
    pub llm_estimate: NutritionFields,
    pub db_estimate: Option<NutrientTotals>,
    pub food_matches: Vec<FoodMatch>,
    pub unmatched_items: Vec<String>,
    pub suggestions: Vec<UnmatchedSuggestions>,
    pub confidence_score: Option<f64>,
}

/// Attach a database estimate for `food_items` to `llm`.
///
/// Without a matcher (the reference store failed to load) or without any
/// items, the model estimate is returned unchanged.
pub fn enhance_estimate<S: AsRef<str>>(
    llm: NutritionFields,
    food_items: &[S],
    matcher: Option<&NutritionMatcher>,
) -> EnhancedEstimate {
    let original = EnhancedEstimate {
        llm_estimate: llm,
        ..EnhancedEstimate::default()
    };

    let Some(matcher) = matcher else {
        warn!("Reference database unavailable; returning model estimate only");
        return original;
    };
    if food_items.is_empty() {
        debug!("No food items to match");
        return original;
    }

    let analysis = matcher.analyze_meal(food_items);
    EnhancedEstimate {
        llm_estimate: llm,
        db_estimate: Some(analysis.totals),
        food_matches: analysis.matched_items,
        unmatched_items: analysis.unmatched_items,
        suggestions: analysis.suggestions,
        confidence_score: Some(analysis.confidence_score),
    }
}

/// Everything known about one meal photo.
#[derive(Debug, Clone, Serialize)]
pub struct MealReport {
    pub image_path: PathBuf,
    pub success: bool,
    pub llm_estimate: NutritionFields,
    pub db_estimate: Option<NutrientTotals>,
    pub food_items: Vec<String>,
    pub plant_items: Vec<String>,
    pub unique_plants: usize,
    pub food_matches: Vec<FoodMatch>,
    pub unmatched_items: Vec<String>,
    pub suggestions: Vec<UnmatchedSuggestions>,
    pub confidence_score: Option<f64>,
    /// The model's reply verbatim.
    pub details: String,
    pub error: Option<String>,
}

impl MealReport {
    fn failed(image_path: &Path, error: String) -> Self {
        Self {
            image_path: image_path.to_path_buf(),
            success: false,
            llm_estimate: NutritionFields::default(),
            db_estimate: None,
            food_items: Vec::new(),
            plant_items: Vec::new(),
            unique_plants: 0,
            food_matches: Vec::new(),
            unmatched_items: Vec::new(),
            suggestions: Vec::new(),
            confidence_score: None,
            details: String::new(),
            error: Some(error),
        }
    }
}

/// Estimate, parse, match and combine for a single image.
pub async fn analyze_image(
    client: &InferenceClient,
    matcher: Option<&NutritionMatcher>,
    parser: &dyn ReplyParser,
    path: &Path,
) -> MealReport {
    let result = client.estimate(path).await;
    build_report(result, matcher, parser)
}

/// Like [`analyze_image`] for several photos, sent through the client's
/// batched path. Reports come back in input order.
pub async fn analyze_images<P: AsRef<Path>>(
    client: &InferenceClient,
    matcher: Option<&NutritionMatcher>,
    parser: &dyn ReplyParser,
    paths: &[P],
) -> Vec<MealReport> {
    client
        .estimate_batch(paths)
        .await
        .into_iter()
        .map(|result| build_report(result, matcher, parser))
        .collect()
}

fn build_report(
    result: InferenceResult,
    matcher: Option<&NutritionMatcher>,
    parser: &dyn ReplyParser,
) -> MealReport {
    if !result.success {
        return MealReport::failed(&result.image_path, result.raw_text);
    }

    let text = result.raw_text;
    let llm = parser.extract_nutrition(&text);
    let food_items = parser.extract_food_items(&text);
    let plant_items = parser.extract_plant_items(&text);
    let enhanced = enhance_estimate(llm, food_items.as_slice(), matcher);

    MealReport {
        image_path: result.image_path,
        success: true,
        llm_estimate: enhanced.llm_estimate,
        db_estimate: enhanced.db_estimate,
        unique_plants: unique_plant_count(&plant_items),
        food_items,
        plant_items,
        food_matches: enhanced.food_matches,
        unmatched_items: enhanced.unmatched_items,
        suggestions: enhanced.suggestions,
        confidence_score: enhanced.confidence_score,
        details: text,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ClientOptions;
    use crate::inference::mock::{MockReply, ScriptedTransport};
    use crate::matcher::MatchConfig;
    use crate::matcher::text::TextRules;
    use crate::response::TextContractParser;
    use crate::store::{FoodId, FoodItem, NutrientStore};
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    const REPLY: &str = "CALORIES: 520
Carbohydrates: 40g
Protein: 65g
Fat: 8g
Fiber: 3g

Food Items:
- Grilled chicken breast (200g)
- Mystery sauce (30g)

Plant-based Ingredients:
- Parsley
";

    fn matcher() -> NutritionMatcher {
        let chicken = FoodItem {
            name: "Chicken breast, grilled".to_string(),
            id: FoodId::Number(171477),
            nutrients: HashMap::from([
                ("Energy (KCAL)".to_string(), 165.0),
                ("Protein (G)".to_string(), 31.0),
            ]),
        };
        NutritionMatcher::new(
            Arc::new(NutrientStore::from_items(vec![chicken])),
            TextRules::default(),
            MatchConfig::default(),
        )
    }

    fn llm() -> NutritionFields {
        NutritionFields {
            calories: Some(520.0),
            ..NutritionFields::default()
        }
    }

    #[test]
    fn test_enhance_side_by_side() {
        let m = matcher();
        let items = ["Grilled chicken breast (200g)", "Mystery sauce (30g)"];
        let enhanced = enhance_estimate(llm(), &items, Some(&m));

        assert_eq!(enhanced.llm_estimate.calories, Some(520.0));
        let db = enhanced.db_estimate.unwrap();
        assert_eq!(db.calories, 330.0);
        assert_eq!(db.protein, 62.0);
        assert_eq!(enhanced.food_matches.len(), 1);
        assert_eq!(enhanced.unmatched_items, vec!["Mystery sauce (30g)"]);
        let confidence = enhanced.confidence_score.unwrap();
        assert!(confidence > 0.0 && confidence <= 50.0);
    }

    #[test]
    fn test_enhance_without_matcher_echoes_original() {
        let enhanced = enhance_estimate(llm(), &["Grilled chicken breast (200g)"], None);
        assert_eq!(enhanced.llm_estimate, llm());
        assert_eq!(enhanced.db_estimate, None);
        assert!(enhanced.food_matches.is_empty());
        assert_eq!(enhanced.confidence_score, None);
    }

    #[test]
    fn test_enhance_without_items_echoes_original() {
        let m = matcher();
        let empty: [&str; 0] = [];
        let enhanced = enhance_estimate(llm(), &empty, Some(&m));
        assert_eq!(enhanced.db_estimate, None);
        assert_eq!(enhanced.llm_estimate, llm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_image_pipeline() {
        let dir = tempdir().unwrap();
        let img = dir.path().join("lunch.png");
        RgbImage::from_pixel(40, 30, Rgb([10, 200, 10]))
            .save(&img)
            .unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![MockReply::content(REPLY)]));
        let client = InferenceClient::new(transport, ClientOptions::default());
        let m = matcher();

        let report = analyze_image(&client, Some(&m), &TextContractParser, &img).await;
        assert!(report.success);
        assert_eq!(report.error, None);
        assert_eq!(report.llm_estimate.calories, Some(520.0));
        assert_eq!(report.llm_estimate.fiber, Some(3.0));
        assert_eq!(report.food_items.len(), 2);
        assert_eq!(report.plant_items, vec!["Parsley"]);
        assert_eq!(report.unique_plants, 1);
        assert_eq!(report.db_estimate.unwrap().calories, 330.0);
        assert_eq!(report.details, REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_image_failure() {
        let dir = tempdir().unwrap();
        let img = dir.path().join("lunch.png");
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(&img).unwrap();

        let transport = Arc::new(ScriptedTransport::always(MockReply::Status(500)));
        let options = ClientOptions {
            max_retries: 2,
            ..ClientOptions::default()
        };
        let client = InferenceClient::new(transport, options);

        let report = analyze_image(&client, None, &TextContractParser, &img).await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("Max retries exceeded"));
        assert!(report.llm_estimate.is_empty());
        assert!(report.food_items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_images_batched_in_order() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for name in ["a.png", "b.png", "c.png"] {
            let path = dir.path().join(name);
            RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]))
                .save(&path)
                .unwrap();
            paths.push(path);
        }
        let missing = dir.path().join("gone.png");
        paths.insert(1, missing.clone());

        let transport = Arc::new(ScriptedTransport::always(MockReply::content(REPLY)));
        let options = ClientOptions {
            batch_size: 2,
            batch_pause: std::time::Duration::from_secs(2),
            ..ClientOptions::default()
        };
        let client = InferenceClient::new(transport.clone(), options);
        let m = matcher();

        let start = tokio::time::Instant::now();
        let reports = analyze_images(&client, Some(&m), &TextContractParser, paths.as_slice()).await;

        assert_eq!(reports.len(), 4);
        let order: Vec<_> = reports.iter().map(|r| r.image_path.clone()).collect();
        assert_eq!(order, paths);
        assert!(!reports[1].success);
        assert!(reports[1].error.is_some());
        for i in [0, 2, 3] {
            assert!(reports[i].success);
            assert_eq!(reports[i].db_estimate.as_ref().unwrap().calories, 330.0);
        }
        assert_eq!(transport.calls(), 3);
        // Two chunks, one pause between them
        assert!(start.elapsed() >= std::time::Duration::from_secs(2));
    }
}
