//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Partitioned response cache with SQLite backend
//! - Request/response value types shared with the network client
//! - The asset cache worker and its retrieval strategies
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod worker;

pub use cache::{CacheDb, Partition};
pub use config::{AppConfig, VersionTags};
pub use error::Error;
pub use http::{Destination, Request, StoredResponse};
pub use worker::{
    ActivateReport, AssetCacheWorker, FetchOutcome, InstallReport, Network, NetworkError, ResponseSource, Revalidation,
    Route, Strategy, WorkerState,
};
