//! Retrieval strategies.
//!
//! | Destination | Strategy |
//! |---|---|
//! | document | network-first, cache fallback, else 503 |
//! | image | cache-first, network fallback, else 404 |
//! | anything else | stale-while-revalidate |
//!
//! Every network response, whatever its status, is written to the dynamic
//! partition. A failed write is logged and the network response is still
//! handed back to the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AssetCacheWorker, FetchOutcome, Network, NetworkError, ResponseSource, Revalidation};
use crate::Error;
use crate::cache::CacheDb;
use crate::http::{Destination, Request, StoredResponse};

/// Policy governing whether a request is served from cache or network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn for_destination(destination: Destination) -> Self {
        match destination {
            Destination::Document => Strategy::NetworkFirst,
            Destination::Image => Strategy::CacheFirst,
            _ => Strategy::StaleWhileRevalidate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network_first",
            Strategy::CacheFirst => "cache_first",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
        }
    }
}

/// How the worker handles one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Served through a caching strategy.
    Intercept(Strategy),
    /// Out of scope: fetched from the network and never cached.
    Passthrough,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Intercept(strategy) => strategy.as_str(),
            Route::Passthrough => "passthrough",
        }
    }
}

async fn put_dynamic(
    db: &CacheDb, partition: &str, request: &Request, response: &StoredResponse,
) -> Result<(), Error> {
    db.open_partition(partition).await?.put(request, response).await
}

/// Write a fresh network response into `partition`, logging on failure.
async fn store_fresh(db: &CacheDb, partition: &str, request: &Request, response: &StoredResponse) {
    if let Err(e) = put_dynamic(db, partition, request, response).await {
        tracing::warn!(url = %request.url, partition, error = %e, "failed to cache response");
    }
}

impl<N: Network> AssetCacheWorker<N> {
    fn outcome(&self, response: StoredResponse, source: ResponseSource, strategy: Strategy) -> FetchOutcome {
        FetchOutcome { response, source, route: Route::Intercept(strategy), revalidation: None }
    }

    pub(crate) async fn network_first(&self, request: Request) -> Result<FetchOutcome, Error> {
        let strategy = Strategy::NetworkFirst;
        match self.network.fetch(&request).await {
            Ok(response) => {
                store_fresh(&self.db, &self.versions.dynamic_cache, &request, &response).await;
                Ok(self.outcome(response, ResponseSource::Network, strategy))
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "network failed, trying cache");
                match self.db.match_request(&request).await? {
                    Some(cached) => Ok(self.outcome(cached, ResponseSource::Cache, strategy)),
                    None => Ok(self.outcome(StoredResponse::offline(), ResponseSource::Synthesized, strategy)),
                }
            }
        }
    }

    pub(crate) async fn cache_first(&self, request: Request) -> Result<FetchOutcome, Error> {
        let strategy = Strategy::CacheFirst;
        if let Some(cached) = self.db.match_request(&request).await? {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(self.outcome(cached, ResponseSource::Cache, strategy));
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                store_fresh(&self.db, &self.versions.dynamic_cache, &request, &response).await;
                Ok(self.outcome(response, ResponseSource::Network, strategy))
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "image unavailable");
                Ok(self.outcome(StoredResponse::image_unavailable(), ResponseSource::Synthesized, strategy))
            }
        }
    }

    /// Answer from cache when possible while always refreshing from the network.
    ///
    /// The refresh runs as its own task. On a hit the caller gets the cached
    /// response at once and the task keeps running; on a miss the caller
    /// waits for that same task.
    pub(crate) async fn stale_while_revalidate(&self, request: Request) -> Result<FetchOutcome, Error> {
        let strategy = Strategy::StaleWhileRevalidate;
        let cached = self.db.match_request(&request).await?;

        let db = self.db.clone();
        let network = Arc::clone(&self.network);
        let partition = self.versions.dynamic_cache.clone();
        let refresh = request.clone();
        let handle = tokio::spawn(async move {
            let response = network.fetch(&refresh).await?;
            store_fresh(&db, &partition, &refresh, &response).await;
            Ok::<_, NetworkError>(response)
        });

        if let Some(cached) = cached {
            tracing::debug!(url = %request.url, "serving stale, revalidating");
            let mut outcome = self.outcome(cached, ResponseSource::Cache, strategy);
            outcome.revalidation = Some(Revalidation(handle));
            return Ok(outcome);
        }

        match handle.await {
            Ok(Ok(response)) => Ok(self.outcome(response, ResponseSource::Network, strategy)),
            Ok(Err(e)) => {
                tracing::warn!(url = %request.url, error = %e, "network failed with nothing cached");
                Ok(self.outcome(StoredResponse::offline(), ResponseSource::Synthesized, strategy))
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "revalidation task aborted");
                Ok(self.outcome(StoredResponse::offline(), ResponseSource::Synthesized, strategy))
            }
        }
    }

    pub(crate) async fn passthrough(&self, request: Request) -> Result<FetchOutcome, Error> {
        let (response, source) = match self.network.fetch(&request).await {
            Ok(response) => (response, ResponseSource::Network),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "passthrough fetch failed");
                (StoredResponse::offline(), ResponseSource::Synthesized)
            }
        };
        Ok(FetchOutcome { response, source, route: Route::Passthrough, revalidation: None })
    }
}
