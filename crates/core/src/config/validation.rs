//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `origin` is not an http(s) URL or a manifest entry does not resolve
    /// - a version name is empty or two version names collide
    ///
    /// Returns `ConfigError::Missing` if the manifest is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        let names = self.versions.names();
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid { field: "versions".into(), reason: "names must not be empty".into() });
        }
        if names.iter().collect::<HashSet<_>>().len() != names.len() {
            return Err(ConfigError::Invalid { field: "versions".into(), reason: "names must be distinct".into() });
        }

        if self.manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "manifest".into(),
                hint: "list at least one URL to precache".into(),
            });
        }
        if self.manifest.iter().any(|entry| entry.trim().is_empty()) {
            return Err(ConfigError::Invalid { field: "manifest".into(), reason: "entries must not be empty".into() });
        }

        let urls = self.manifest_urls()?;
        let unique: HashSet<_> = urls.iter().map(|url| url.as_str()).collect();
        if unique.len() != urls.len() {
            tracing::warn!(
                manifest_count = urls.len(),
                unique_count = unique.len(),
                "manifest lists the same URL more than once; duplicates are stored once"
            );
        }

        Ok(())
    }
}
