//! Worker lifecycle and fetch tools.
//!
//! `worker_install` and `worker_activate` drive the lifecycle events;
//! `worker_fetch` plays the part of a page issuing a request.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::{AssetCacheWorker, Destination, Error, Network, Request};

/// Output from the worker_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerInstallOutput {
    /// Partition the manifest was cached into.
    pub partition: String,
    /// Number of manifest entries stored.
    pub cached: usize,
    /// Whether the worker may activate without waiting for old clients.
    pub skip_waiting: bool,
}

/// Output from the worker_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerActivateOutput {
    /// Partitions belonging to the current version.
    pub kept: Vec<String>,
    /// Partitions removed during cleanup.
    pub deleted: Vec<String>,
}

/// Input parameters for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// URL to request; relative URLs resolve against the site origin.
    pub url: String,

    /// Declared resource kind. Inferred from the path when omitted.
    #[serde(default)]
    pub destination: Option<Destination>,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

/// Output structure for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    pub url: String,
    pub method: String,
    pub destination: Destination,
    /// Strategy name, or "passthrough" for requests outside the worker scope.
    pub route: String,
    /// One of "network", "cache" or "synthesized".
    pub source: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body_len: usize,
    /// Body as text when it is valid UTF-8.
    pub body: Option<String>,
    /// True when a background refresh of a cached entry is still running.
    pub revalidating: bool,
}

fn text_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the worker_install tool.
pub async fn install_impl<N: Network>(worker: &AssetCacheWorker<N>) -> Result<CallToolResult, McpError> {
    let report = worker.install().await?;
    text_result(&WorkerInstallOutput {
        partition: report.partition,
        cached: report.cached,
        skip_waiting: report.skip_waiting,
    })
}

/// Implementation of the worker_activate tool.
pub async fn activate_impl<N: Network>(worker: &AssetCacheWorker<N>) -> Result<CallToolResult, McpError> {
    let report = worker.activate().await?;
    text_result(&WorkerActivateOutput { kept: report.kept, deleted: report.deleted })
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl<N: Network>(
    worker: &AssetCacheWorker<N>, params: WorkerFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let url = swcache_client::resolve(worker.origin(), &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let destination = params.destination.unwrap_or_else(|| Destination::infer(&url));
    let method = params
        .method
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "GET".to_string());

    let request = Request { method: method.clone(), url: url.clone(), destination };
    let outcome = worker.handle_fetch(request).await?;

    let response = outcome.response;
    let output = WorkerFetchOutput {
        url: url.to_string(),
        method,
        destination,
        route: outcome.route.as_str().to_string(),
        source: serde_json::to_value(outcome.source)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        status: response.status,
        content_type: response.content_type().map(str::to_string),
        body_len: response.body.len(),
        body: std::str::from_utf8(&response.body).ok().map(str::to_string),
        revalidating: outcome.revalidation.as_ref().is_some_and(|r| !r.is_finished()),
    };

    text_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swcache_core::worker::mock::MockNetwork;
    use swcache_core::{AppConfig, CacheDb};

    fn output<T: for<'de> Deserialize<'de>>(result: &CallToolResult) -> T {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }

    async fn setup() -> (AssetCacheWorker<MockNetwork>, Arc<MockNetwork>) {
        let config = AppConfig { origin: "https://srengenge.test".into(), ..Default::default() };
        let network = Arc::new(MockNetwork::new());
        for url in config.manifest_urls().unwrap() {
            network.serve(url.as_str(), 200, &format!("cached {}", url.path()));
        }
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = AssetCacheWorker::from_config(db, Arc::clone(&network), &config).unwrap();
        (worker, network)
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let (worker, _network) = setup().await;

        let installed: WorkerInstallOutput = output(&install_impl(&worker).await.unwrap());
        assert_eq!(installed.partition, "srengenge-static-v1.1.0");
        assert_eq!(installed.cached, 7);
        assert!(installed.skip_waiting);

        let activated: WorkerActivateOutput = output(&activate_impl(&worker).await.unwrap());
        assert_eq!(activated.kept, vec!["srengenge-static-v1.1.0"]);
        assert!(activated.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_install_failure_maps_to_error_code() {
        let (worker, network) = setup().await;
        network.fail("https://srengenge.test/script.js");

        let err = install_impl(&worker).await.unwrap_err();
        assert_eq!(err.code.0, -32020);
    }

    #[tokio::test]
    async fn test_fetch_before_activate() {
        let (worker, _network) = setup().await;
        let params = WorkerFetchParams { url: "/".into(), destination: None, method: None };

        let err = fetch_impl(&worker, params).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }

    #[tokio::test]
    async fn test_fetch_offline_document_served_from_cache() {
        let (worker, network) = setup().await;
        install_impl(&worker).await.unwrap();
        activate_impl(&worker).await.unwrap();
        network.set_offline(true);

        let params = WorkerFetchParams { url: "/index.html".into(), destination: None, method: None };
        let fetched: WorkerFetchOutput = output(&fetch_impl(&worker, params).await.unwrap());

        assert_eq!(fetched.url, "https://srengenge.test/index.html");
        assert_eq!(fetched.destination, Destination::Document);
        assert_eq!(fetched.route, "network_first");
        assert_eq!(fetched.source, "cache");
        assert_eq!(fetched.body.as_deref(), Some("cached /index.html"));
    }

    #[tokio::test]
    async fn test_fetch_offline_uncached_image_is_404() {
        let (worker, network) = setup().await;
        install_impl(&worker).await.unwrap();
        activate_impl(&worker).await.unwrap();
        network.set_offline(true);

        let params =
            WorkerFetchParams { url: "/img/gallery.png".into(), destination: Some(Destination::Image), method: None };
        let fetched: WorkerFetchOutput = output(&fetch_impl(&worker, params).await.unwrap());

        assert_eq!(fetched.status, 404);
        assert_eq!(fetched.source, "synthesized");
        assert_eq!(fetched.body.as_deref(), Some("Image not available"));
    }

    #[tokio::test]
    async fn test_fetch_post_passes_through() {
        let (worker, network) = setup().await;
        install_impl(&worker).await.unwrap();
        activate_impl(&worker).await.unwrap();
        network.serve("https://srengenge.test/contact", 200, "sent");

        let params = WorkerFetchParams { url: "/contact".into(), destination: None, method: Some("post".into()) };
        let fetched: WorkerFetchOutput = output(&fetch_impl(&worker, params).await.unwrap());

        assert_eq!(fetched.method, "POST");
        assert_eq!(fetched.route, "passthrough");
        assert_eq!(fetched.source, "network");
    }

    #[tokio::test]
    async fn test_fetch_empty_url() {
        let (worker, _network) = setup().await;
        let params = WorkerFetchParams { url: "  ".into(), destination: None, method: None };
        assert!(fetch_impl(&worker, params).await.is_err());
    }
}
