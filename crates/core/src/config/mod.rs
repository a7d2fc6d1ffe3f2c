//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Partition names for one deployed version of the site.
///
/// All three must change together when deployed assets change. Activation
/// keeps exactly these names and deletes every other partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTags {
    /// Umbrella name for the version.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Partition precached from the manifest at install time.
    #[serde(default = "default_static_cache")]
    pub static_cache: String,

    /// Partition filled lazily while serving requests.
    #[serde(default = "default_dynamic_cache")]
    pub dynamic_cache: String,
}

fn default_cache_name() -> String {
    "srengenge-v1.1.0".into()
}

fn default_static_cache() -> String {
    "srengenge-static-v1.1.0".into()
}

fn default_dynamic_cache() -> String {
    "srengenge-dynamic-v1.1.0".into()
}

impl Default for VersionTags {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            static_cache: default_static_cache(),
            dynamic_cache: default_dynamic_cache(),
        }
    }
}

impl VersionTags {
    /// Every partition name belonging to this version.
    pub fn names(&self) -> [&str; 3] {
        [&self.cache_name, &self.static_cache, &self.dynamic_cache]
    }

    /// Whether a partition name belongs to this version.
    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(&name)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site origin; defines the worker scope and resolves relative URLs.
    ///
    /// Set via SWCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache database.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SWCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via SWCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SWCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Partition names for the current version.
    ///
    /// Set via SWCACHE_VERSIONS__STATIC_CACHE and friends.
    #[serde(default)]
    pub versions: VersionTags,

    /// URLs precached into the static partition at install.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/styles.css",
        "/script.js",
        "/img/backgroundhero.png",
        "/img/srngengelogoo.png",
        "/img/texthero.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            versions: VersionTags::default(),
            manifest: default_manifest(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The configured origin as a URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(url),
            _ => Err(ConfigError::Invalid { field: "origin".into(), reason: "must be an http(s) URL with a host".into() }),
        }
    }

    /// Manifest entries resolved against the origin, in manifest order.
    pub fn manifest_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin_url()?;
        self.manifest
            .iter()
            .map(|entry| {
                origin
                    .join(entry.trim())
                    .map_err(|e| ConfigError::Invalid { field: "manifest".into(), reason: format!("{entry}: {e}") })
            })
            .collect()
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWCACHE_`
    /// 2. TOML file from `SWCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
