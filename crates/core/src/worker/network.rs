//! The seam between the worker and whatever actually performs HTTP.

use crate::http::{Request, StoredResponse};

/// Failure to obtain any response at all.
///
/// An HTTP error status is not a `NetworkError`: the server answered, and
/// the strategies decide what to do with the status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("network unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Performs network fetches on behalf of the worker.
#[async_trait::async_trait]
pub trait Network: Send + Sync + 'static {
    /// Fetch a request from the network.
    async fn fetch(&self, request: &Request) -> Result<StoredResponse, NetworkError>;
}
