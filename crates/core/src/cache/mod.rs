//! SQLite-backed partitioned response cache.
//!
//! This module provides named cache partitions holding request → response
//! entries, persisted with async access via tokio-rusqlite. It supports:
//!
//! - Request keys derived by SHA-256 hashing (method + URL)
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Cross-partition lookups in partition creation order
//! - All-or-nothing eviction per partition

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::EntryMeta;
pub use partitions::Partition;
