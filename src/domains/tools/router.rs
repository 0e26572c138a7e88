//! Tool Router - builds the rmcp ToolRouter from the registry.
//!
//! Every descriptor becomes one route, plus the two aggregate tools. Routes
//! delegate to the [`Gateway`], so adding a descriptor to the catalog is
//! enough to expose it over every transport.

use std::sync::Arc;

use futures::FutureExt;
use rmcp::{
    handler::server::tool::{ToolCallContext, ToolRoute, ToolRouter, schema_for_type},
    model::{CallToolResult, Content, Tool},
};
use serde_json::{Value, json};

use super::aggregate::{
    BATCH_QUOTES, BATCH_QUOTES_DESCRIPTION, COMPARE_STOCKS, COMPARE_STOCKS_DESCRIPTION,
    SymbolsParams,
};
use super::descriptor::ToolDescriptor;
use super::error::ToolError;
use super::registry::ToolRegistry;
use crate::core::server::Gateway;

/// MCP tool model for a descriptor.
pub fn descriptor_tool(descriptor: &ToolDescriptor) -> Tool {
    Tool {
        name: descriptor.name.clone().into(),
        description: Some(descriptor.description.clone().into()),
        input_schema: Arc::new(descriptor.input_schema()),
        annotations: None,
        output_schema: None,
        icons: None,
        meta: None,
        title: None,
    }
}

/// MCP tool models for the aggregate tools.
pub fn aggregate_tools() -> Vec<Tool> {
    [
        (BATCH_QUOTES, BATCH_QUOTES_DESCRIPTION),
        (COMPARE_STOCKS, COMPARE_STOCKS_DESCRIPTION),
    ]
    .into_iter()
    .map(|(name, description)| Tool {
        name: name.into(),
        description: Some(description.into()),
        input_schema: Arc::new(schema_for_type::<SymbolsParams>()),
        annotations: None,
        output_schema: None,
        icons: None,
        meta: None,
        title: None,
    })
    .collect()
}

/// Every tool the gateway exposes, sorted by name.
pub fn all_tools(registry: &ToolRegistry) -> Vec<Tool> {
    let mut tools: Vec<Tool> = registry
        .descriptors()
        .map(|d| descriptor_tool(d))
        .chain(aggregate_tools())
        .collect();
    tools.sort_by(|a, b| a.name.cmp(&b.name));
    tools
}

/// Render a tool outcome as an MCP result.
///
/// Failures are reported in-band (`is_error`) with the structured error
/// report, so clients can tell retryable failures apart.
pub fn to_call_result(result: Result<Value, ToolError>) -> CallToolResult {
    match result {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            let structured = if value.is_object() {
                value
            } else {
                json!({ "result": value })
            };
            CallToolResult {
                content: vec![Content::text(text)],
                structured_content: Some(structured),
                is_error: Some(false),
                meta: None,
            }
        }
        Err(e) => CallToolResult {
            content: vec![Content::text(e.to_string())],
            structured_content: Some(json!({ "error": e.report() })),
            is_error: Some(true),
            meta: None,
        },
    }
}

/// Build the tool router for the STDIO transport.
///
/// STDIO callers act with the gateway's local credential.
pub fn build_tool_router<S>(gateway: Arc<Gateway>) -> ToolRouter<S>
where
    S: Send + Sync + 'static,
{
    all_tools(gateway.registry())
        .into_iter()
        .fold(ToolRouter::new(), |router, tool| {
            router.with_route(create_route(tool, gateway.clone()))
        })
}

fn create_route<S>(tool: Tool, gateway: Arc<Gateway>) -> ToolRoute<S>
where
    S: Send + Sync + 'static,
{
    let name = tool.name.to_string();
    ToolRoute::new_dyn(tool, move |ctx: ToolCallContext<'_, S>| {
        let args = ctx.arguments.clone().unwrap_or_default();
        let gateway = gateway.clone();
        let name = name.clone();
        async move {
            let result = gateway
                .call_tool(&name, args, gateway.local_credential())
                .await;
            Ok(to_call_result(result))
        }
        .boxed()
    })
}
