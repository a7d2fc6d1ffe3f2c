//! Request cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// Methods are case-insensitive; the URL is hashed exactly as given, so
/// callers should pass an already-normalized URL.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let key1 = compute_request_key("GET", "https://site.test/");
        let key2 = compute_request_key("GET", "https://site.test/");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_key_method_case() {
        assert_eq!(
            compute_request_key("get", "https://site.test/"),
            compute_request_key("GET", "https://site.test/")
        );
    }

    #[test]
    fn test_key_different_url() {
        let a = compute_request_key("GET", "https://site.test/styles.css");
        let b = compute_request_key("GET", "https://site.test/script.js");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_format() {
        let key = compute_request_key("GET", "https://site.test/");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
