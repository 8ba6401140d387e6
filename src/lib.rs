//! # mealscope: Meal Photo Nutrition Estimator
//!
//! Sends a meal photo to a vision model for a calorie and macronutrient
//! estimate, then resolves the food items the model listed against a
//! reference food-composition database to produce a second, independent
//! estimate.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading and validation
//! - **[`store`]**: Read-only reference nutrient store (JSON food database)
//! - **[`matcher`]**: Text normalization, portion parsing and fuzzy food matching
//! - **[`inference`]**: Vision-model client with concurrency gate and backoff retries
//! - **[`response`]**: Extraction of nutrition fields and item lists from model replies
//! - **[`enhance`]**: Side-by-side combination of model and database estimates
//! - **[`batch`]**: Evaluation runs over labelled photo sets
//! - **[`mcp`]**: MCP server exposing the pipeline as tools (stdio transport via rmcp)

pub mod batch;
pub mod config;
pub mod enhance;
pub mod inference;
pub mod matcher;
pub mod mcp;
pub mod response;
pub mod store;
