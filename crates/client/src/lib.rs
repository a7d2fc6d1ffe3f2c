//! Client code for swcache.
//!
//! This crate provides the HTTP fetch client the asset cache worker uses as
//! its network, plus URL resolution against the site origin.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, UrlError, resolve};
