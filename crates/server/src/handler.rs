//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::cache::{CacheListParams, CachePurgeParams, list_impl, purge_impl};
use crate::tools::worker::{WorkerFetchParams, activate_impl, fetch_impl, install_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use swcache_client::FetchClient;
use swcache_core::AssetCacheWorker;

/// The main MCP server handler for swcache.
#[derive(Clone)]
pub struct SwcacheServer {
    worker: Arc<AssetCacheWorker<FetchClient>>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SwcacheServer {
    /// Create a new server handler around a worker.
    pub fn new(worker: AssetCacheWorker<FetchClient>) -> Self {
        Self { worker: Arc::new(worker), tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Run the install event: fetch every manifest URL and store them in the static partition. Fails without caching anything if any fetch fails."
    )]
    async fn worker_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Run the activate event: delete cache partitions that don't belong to the current version.")]
    async fn worker_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    /// Serve a request through the active worker.
    ///
    /// Documents are network-first, images cache-first, and everything else
    /// stale-while-revalidate. Non-GET and cross-origin requests pass through.
    #[tool(
        description = "Issue a request through the worker. Returns status, body and whether it came from network, cache or an offline fallback."
    )]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "List cache partitions in creation order, optionally with entry metadata.")]
    async fn cache_list(&self, params: Parameters<CacheListParams>) -> Result<CallToolResult, McpError> {
        list_impl(&self.worker, params.0).await
    }

    #[tool(description = "Delete a cache partition, or one URL's entry within it.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for SwcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "swcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swcache_client::FetchConfig;
    use swcache_core::{AppConfig, CacheDb};

    async fn server() -> SwcacheServer {
        let config = AppConfig::default();
        let db = CacheDb::open_in_memory().await.unwrap();
        let client = Arc::new(FetchClient::new(FetchConfig::from(&config)).unwrap());
        SwcacheServer::new(AssetCacheWorker::from_config(db, client, &config).unwrap())
    }

    #[tokio::test]
    async fn test_tools_registered() {
        let server = server().await;
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["cache_list", "cache_purge", "worker_activate", "worker_fetch", "worker_install"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let info = server().await.get_info();
        assert_eq!(info.server_info.name, "swcache");
    }
}
