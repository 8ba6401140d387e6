/// MCP Server setup using `rmcp` with stdio transport.
///
/// Provides `McpContext` (shared state) and `McpServer` (startup logic).
use crate::mcp::tools::AppTools;
use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use std::sync::Arc;

use crate::{
    config::Config, inference::InferenceClient, matcher::NutritionMatcher,
    response::ReplyParser,
};

/// Shared application context available to all tool handlers.
///
/// `client` is `None` when no API key is configured and `matcher` is `None`
/// when the reference database failed to load; tools degrade accordingly.
#[derive(Clone)]
pub struct McpContext {
    pub config: Arc<Config>,
    pub client: Option<Arc<InferenceClient>>,
    pub matcher: Option<Arc<NutritionMatcher>>,
    pub parser: Arc<dyn ReplyParser>,
}

/// MCP Server wrapping the context and serving via stdio.
#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Start the MCP server on stdio transport (blocks until the client disconnects).
    pub async fn start(self) -> Result<()> {
        tracing::info!("Starting MCP server on stdio...");
        let (stdin, stdout) = stdio();

        let app_tools = AppTools::new(self.ctx.clone());
        let router = Router::new(app_tools.clone()).with_tools(app_tools.tool_router.clone());

        let service = router
            .serve((stdin, stdout))
            .await
            .context("MCP Server encountered an error during stdio transport")?;
        service
            .waiting()
            .await
            .context("MCP Server stopped unexpectedly")?;

        Ok(())
    }
}
