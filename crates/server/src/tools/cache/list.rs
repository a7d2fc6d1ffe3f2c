//! cache_list tool implementation.
//!
//! Lists partitions in creation order, optionally with their entries.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::cache::EntryMeta;
use swcache_core::{AssetCacheWorker, Error, Network, WorkerState};

/// Parameters for the cache_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheListParams {
    /// Only list this partition.
    #[serde(default)]
    pub partition: Option<String>,

    /// Include per-entry metadata (default: false).
    #[serde(default)]
    pub entries: bool,
}

/// One partition in the cache_list output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartitionSummary {
    pub name: String,
    /// Whether the partition belongs to the running worker version.
    pub current: bool,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryMeta>,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub state: WorkerState,
    pub partitions: Vec<PartitionSummary>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl<N: Network>(
    worker: &AssetCacheWorker<N>, params: CacheListParams,
) -> Result<CallToolResult, McpError> {
    let db = worker.db();
    let mut names = db.partition_names().await?;
    if let Some(only) = params.partition.as_deref() {
        names.retain(|name| name == only);
    }

    let mut partitions = Vec::with_capacity(names.len());
    for name in names {
        let partition = db.open_partition(&name).await?;
        let entries = if params.entries { partition.keys().await? } else { Vec::new() };
        partitions.push(PartitionSummary {
            current: worker.versions().contains(&name),
            count: partition.len().await?,
            entries,
            name,
        });
    }

    let output = CacheListOutput { state: worker.state().await, partitions };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
