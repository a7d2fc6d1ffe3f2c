//! The asset cache worker.
//!
//! Owns the partition lifecycle across `install` and `activate`, and serves
//! intercepted requests through one of the retrieval strategies in
//! [`strategy`].
//!
//! ### Lifecycle
//! - `Parsed → Installing → Installed → Activating → Activated`
//! - A failed install leaves the worker `Redundant`; a later install may retry.
//! - Requests are only intercepted once `Activated`.

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod network;
pub mod strategy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

use crate::cache::CacheDb;
use crate::config::{AppConfig, VersionTags};
use crate::http::{Destination, Request, StoredResponse};
use crate::Error;

pub use network::{Network, NetworkError};
pub use strategy::{Route, Strategy};

/// Where a worker sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Where the response handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// Result of a successful install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub partition: String,
    pub cached: usize,
    pub skip_waiting: bool,
}

/// Result of a successful activation.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
}

/// A background network refresh started by stale-while-revalidate.
///
/// Dropping it does not cancel the refresh.
#[derive(Debug)]
pub struct Revalidation(pub(crate) JoinHandle<Result<StoredResponse, NetworkError>>);

impl Revalidation {
    /// Wait for the refresh to settle. Returns true if the network answered.
    pub async fn wait(self) -> bool {
        matches!(self.0.await, Ok(Ok(_)))
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// What the worker answered for one intercepted request.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: StoredResponse,
    pub source: ResponseSource,
    pub route: Route,
    /// Pending cache refresh, present only for stale-while-revalidate hits.
    pub revalidation: Option<Revalidation>,
}

/// Serves a site's assets from versioned cache partitions.
///
/// Each event method takes `&self`, so any number of fetches may be in
/// flight at once; they share the store and the network client.
pub struct AssetCacheWorker<N> {
    db: CacheDb,
    network: Arc<N>,
    origin: Url,
    versions: VersionTags,
    manifest: Vec<Url>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl<N: Network> AssetCacheWorker<N> {
    pub fn new(db: CacheDb, network: Arc<N>, origin: Url, versions: VersionTags, manifest: Vec<Url>) -> Self {
        Self {
            db,
            network,
            origin,
            versions,
            manifest,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }

    /// Build a worker from loaded configuration.
    pub fn from_config(db: CacheDb, network: Arc<N>, config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let manifest = config.manifest_urls().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self::new(db, network, origin, config.versions.clone(), manifest))
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether install asked to skip the wait for the previous version's clients.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn versions(&self) -> &VersionTags {
        &self.versions
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    /// Move to `next` if the current state is one of `allowed`.
    async fn transition(&self, allowed: &[WorkerState], next: WorkerState, event: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !allowed.contains(&*state) {
            return Err(Error::InvalidState(format!("cannot {event} while {:?}", *state)));
        }
        *state = next;
        Ok(())
    }

    async fn set_state(&self, next: WorkerState) {
        *self.state.write().await = next;
    }

    /// Handle the `install` event: precache the manifest into the static partition.
    ///
    /// Every manifest URL is fetched concurrently. Entries are written only
    /// after all fetches returned a 2xx response, in a single transaction; any
    /// failure abandons the install and leaves the worker `Redundant`.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(
            &[WorkerState::Parsed, WorkerState::Installed, WorkerState::Redundant],
            WorkerState::Installing,
            "install",
        )
        .await?;

        match self.precache().await {
            Ok(cached) => {
                self.skip_waiting.store(true, Ordering::Release);
                self.set_state(WorkerState::Installed).await;
                tracing::info!(partition = %self.versions.static_cache, cached, "install complete, skipping wait");
                Ok(InstallReport { partition: self.versions.static_cache.clone(), cached, skip_waiting: true })
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                tracing::warn!(error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let partition = self.db.open_partition(&self.versions.static_cache).await?;
        tracing::info!(partition = %partition.name(), count = self.manifest.len(), "caching critical resources");

        let mut join_set = JoinSet::new();
        for (index, url) in self.manifest.iter().cloned().enumerate() {
            let network = Arc::clone(&self.network);
            join_set.spawn(async move {
                let destination = Destination::infer(&url);
                let request = Request::get(url, destination);
                let result = network.fetch(&request).await;
                (index, request, result)
            });
        }

        let mut fetched: Vec<Option<(Request, StoredResponse)>> = (0..self.manifest.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (index, request, result) = joined.map_err(|e| Error::InstallFailed(e.to_string()))?;
            match result {
                Ok(response) if response.is_success() => fetched[index] = Some((request, response)),
                Ok(response) => {
                    return Err(Error::InstallFailed(format!("{}: status {}", request.url, response.status)));
                }
                Err(e) => return Err(Error::InstallFailed(format!("{}: {e}", request.url))),
            }
        }

        let entries: Vec<(Request, StoredResponse)> = fetched.into_iter().flatten().collect();
        partition.put_all(&entries).await?;
        Ok(entries.len())
    }

    /// Handle the `activate` event: delete every partition this version doesn't own.
    ///
    /// Returns once cleanup is done; only then does the worker intercept requests.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating, "activate")
            .await?;

        match self.prune().await {
            Ok(report) => {
                self.set_state(WorkerState::Activated).await;
                tracing::info!(kept = ?report.kept, deleted = report.deleted.len(), "activated, claiming clients");
                Ok(report)
            }
            Err(e) => {
                self.set_state(WorkerState::Installed).await;
                Err(e)
            }
        }
    }

    async fn prune(&self) -> Result<ActivateReport, Error> {
        let mut kept = Vec::new();
        let mut deleted = Vec::new();
        for name in self.db.partition_names().await? {
            if self.versions.contains(&name) {
                kept.push(name);
            } else {
                tracing::info!(partition = %name, "deleting old cache");
                self.db.delete_partition(&name).await?;
                deleted.push(name);
            }
        }
        Ok(ActivateReport { kept, deleted })
    }

    /// Handle a `fetch` event.
    ///
    /// Network failures never surface here; they become cached or
    /// synthesized responses, and failed writes of fresh responses are only
    /// logged. Cache lookup failures and lifecycle misuse are returned as
    /// errors.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome, Error> {
        if self.state().await != WorkerState::Activated {
            return Err(Error::InvalidState(format!("worker is not active; cannot serve {}", request.url)));
        }

        let route = self.route(&request);
        tracing::debug!(url = %request.url, destination = ?request.destination, route = route.as_str(), "fetch");

        match route {
            Route::Passthrough => self.passthrough(request).await,
            Route::Intercept(Strategy::NetworkFirst) => self.network_first(request).await,
            Route::Intercept(Strategy::CacheFirst) => self.cache_first(request).await,
            Route::Intercept(Strategy::StaleWhileRevalidate) => self.stale_while_revalidate(request).await,
        }
    }

    /// Decide how a request is served. Only same-origin GETs are intercepted.
    pub fn route(&self, request: &Request) -> Route {
        if !request.is_get() || request.url.origin() != self.origin.origin() {
            return Route::Passthrough;
        }
        Route::Intercept(Strategy::for_destination(request.destination))
    }
}
