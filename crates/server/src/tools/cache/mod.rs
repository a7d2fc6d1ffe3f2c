//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and clearing cache partitions.

pub mod list;
pub mod purge;

pub use list::{CacheListParams, list_impl};
pub use purge::{CachePurgeParams, purge_impl};
