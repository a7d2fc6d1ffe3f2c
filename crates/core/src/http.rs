//! Request and response values exchanged between the worker, the cache
//! store and the network.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::hash::compute_request_key;

/// The declared resource kind of an intercepted request.
///
/// Mirrors the `destination` a browser attaches to each fetch; it is what
/// the worker routes on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

impl Destination {
    /// Parse a destination name, treating anything unknown as `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "script" | "worker" | "sharedworker" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            _ => Destination::Other,
        }
    }

    /// Guess a destination from the URL path extension.
    ///
    /// Used when a caller does not declare one.
    pub fn infer(url: &Url) -> Self {
        let path = url.path();
        if path.ends_with('/') {
            return Destination::Document;
        }
        let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("html" | "htm") => Destination::Document,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif") => Destination::Image,
            Some("js" | "mjs") => Destination::Script,
            Some("css") => Destination::Style,
            Some("woff" | "woff2" | "ttf" | "otf") => Destination::Font,
            _ => Destination::Other,
        }
    }
}

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    /// A GET request for `url` with the given destination.
    pub fn get(url: Url, destination: Destination) -> Self {
        Self { method: "GET".to_string(), url, destination }
    }

    /// Cache key for this request.
    pub fn cache_key(&self) -> String {
        compute_request_key(&self.method, self.url.as_str())
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A captured (or synthesized) HTTP response.
///
/// Cloning is cheap: the body is reference counted, so storing a copy in the
/// cache while handing the original to the caller costs no extra buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StoredResponse {
    /// Build a plain-text response without any network round-trip.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self {
            status,
            headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: Bytes::from(body),
        }
    }

    /// The response synthesized for a document with no network and no cache entry.
    pub fn offline() -> Self {
        Self::text(503, "Offline")
    }

    /// The response synthesized for an image with no network and no cache entry.
    pub fn image_unavailable() -> Self {
        Self::text(404, "Image not available")
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse("document"), Destination::Document);
        assert_eq!(Destination::parse(" IMAGE "), Destination::Image);
        assert_eq!(Destination::parse("style"), Destination::Style);
        assert_eq!(Destination::parse("audio"), Destination::Other);
        assert_eq!(Destination::parse(""), Destination::Other);
    }

    #[test]
    fn test_destination_infer() {
        let infer = |s: &str| Destination::infer(&Url::parse(s).unwrap());
        assert_eq!(infer("https://site.test/"), Destination::Document);
        assert_eq!(infer("https://site.test/index.html"), Destination::Document);
        assert_eq!(infer("https://site.test/img/logo.PNG"), Destination::Image);
        assert_eq!(infer("https://site.test/script.js"), Destination::Script);
        assert_eq!(infer("https://site.test/styles.css"), Destination::Style);
        assert_eq!(infer("https://site.test/api/data"), Destination::Other);
    }

    #[test]
    fn test_cache_key_depends_on_method() {
        let url = Url::parse("https://site.test/script.js").unwrap();
        let get = Request::get(url.clone(), Destination::Script);
        let head = Request { method: "HEAD".into(), ..get.clone() };
        assert_ne!(get.cache_key(), head.cache_key());
        assert!(get.is_get());
        assert!(!head.is_get());
    }

    #[test]
    fn test_synthesized_responses() {
        let offline = StoredResponse::offline();
        assert_eq!(offline.status, 503);
        assert_eq!(&offline.body[..], b"Offline");
        assert!(!offline.is_success());

        let missing = StoredResponse::image_unavailable();
        assert_eq!(missing.status, 404);
        assert_eq!(missing.content_type(), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = StoredResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "text/css".into())],
            body: Bytes::new(),
        };
        assert_eq!(response.header("content-type"), Some("text/css"));
        assert!(response.is_success());
    }
}
