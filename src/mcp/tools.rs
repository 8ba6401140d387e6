/// MCP Tool handlers for mealscope.
///
/// 1. estimate_meal       – photo → model estimate + database estimate
/// 2. analyze_food_items  – food phrases → database estimate
/// 3. parse_reply         – raw model reply → nutrition fields and item lists
use crate::enhance;
use crate::matcher::{MealAnalysis, NutritionMatcher};
use crate::mcp::server::McpContext;
use crate::response::{ReplyParser, unique_plant_count};
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct ImagePathParam {
    /// Path to the meal photo (jpg, png or webp)
    image_path: String,
}

#[derive(Deserialize, JsonSchema)]
struct FoodItemsParams {
    /// Food phrases, optionally with portions, e.g. 'Brown rice (150g)'
    items: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
struct ReplyTextParam {
    /// Model reply following the CALORIES / Food Items layout
    text: String,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, McpError> {
    serde_json::to_value(value)
        .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))
}

/// Structured view of a model reply.
pub fn parsed_reply(parser: &dyn ReplyParser, text: &str) -> serde_json::Value {
    let plants = parser.extract_plant_items(text);
    serde_json::json!({
        "nutrition": parser.extract_nutrition(text),
        "food_items": parser.extract_food_items(text),
        "unique_plants": unique_plant_count(&plants),
        "plant_items": plants,
    })
}

/// Database estimate for non-blank phrases.
pub fn food_items_analysis(matcher: &NutritionMatcher, items: &[String]) -> MealAnalysis {
    let phrases: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    matcher.analyze_meal(&phrases)
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: estimate_meal ───────────────────────────────────────

    #[tool(
        description = "Estimate calories, macronutrients and fiber for a meal photo. Returns the vision model's estimate and, side by side, an estimate computed from the reference food database for the food items it listed."
    )]
    async fn estimate_meal(
        &self,
        params: Parameters<ImagePathParam>,
    ) -> Result<CallToolResult, McpError> {
        let image_path = &params.0.image_path;
        if image_path.is_empty() {
            return error_result("image_path is required");
        }

        let path = Path::new(image_path);
        if !path.exists() {
            return error_result(&format!("file not found: {image_path}"));
        }

        let Some(client) = &self.ctx.client else {
            return error_result(&format!(
                "inference is not configured: set {}",
                self.ctx.config.inference.api_key_env
            ));
        };

        let report = enhance::analyze_image(
            client,
            self.ctx.matcher.as_deref(),
            self.ctx.parser.as_ref(),
            path,
        )
        .await;

        json_result(to_json(&report)?)
    }

    // ── Tool 2: analyze_food_items ──────────────────────────────────

    #[tool(
        description = "Match food phrases such as 'Grilled chicken breast (200g)' against the reference food database and total their calories and macronutrients. Unmatched phrases come back with near-miss suggestions."
    )]
    async fn analyze_food_items(
        &self,
        params: Parameters<FoodItemsParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(matcher) = &self.ctx.matcher else {
            return error_result(&format!(
                "reference database not loaded: {}",
                self.ctx.config.food_db_path
            ));
        };
        if params.0.items.iter().all(|s| s.trim().is_empty()) {
            return error_result("items must contain at least one food phrase");
        }

        let analysis = food_items_analysis(matcher, &params.0.items);
        json_result(to_json(&analysis)?)
    }

    // ── Tool 3: parse_reply ─────────────────────────────────────────

    #[tool(description = "Extract nutrition totals, food items and plant-based ingredients from a model reply")]
    async fn parse_reply(
        &self,
        params: Parameters<ReplyTextParam>,
    ) -> Result<CallToolResult, McpError> {
        if params.0.text.trim().is_empty() {
            return error_result("text is required");
        }
        json_result(parsed_reply(self.ctx.parser.as_ref(), &params.0.text))
    }
}
