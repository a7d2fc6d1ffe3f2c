//! cache_purge tool implementation.
//!
//! Deletes a whole partition, or a single entry within it.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::{AssetCacheWorker, Destination, Error, Network, Request};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Partition to purge.
    pub partition: String,

    /// Only delete the GET entry for this URL. Relative URLs resolve against the site origin.
    #[serde(default)]
    pub url: Option<String>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
    /// Whether the partition itself was removed.
    pub partition_removed: bool,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl<N: Network>(
    worker: &AssetCacheWorker<N>, params: CachePurgeParams,
) -> Result<CallToolResult, McpError> {
    let name = params.partition.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("partition cannot be empty".to_string()).into());
    }

    let db = worker.db();
    let output = if !db.has_partition(name).await? {
        CachePurgeOutput { deleted: 0, partition_removed: false }
    } else if let Some(url) = params.url {
        let url = swcache_client::resolve(worker.origin(), &url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = Request::get(url, Destination::Other);
        let deleted = db.open_partition(name).await?.delete(&request).await?;
        CachePurgeOutput { deleted: u64::from(deleted), partition_removed: false }
    } else {
        let count = db.open_partition(name).await?.len().await?;
        let removed = db.delete_partition(name).await?;
        CachePurgeOutput { deleted: count, partition_removed: removed }
    };

    tracing::info!(partition = name, deleted = output.deleted, "cache purged");

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
