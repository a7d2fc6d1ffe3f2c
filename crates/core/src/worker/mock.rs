//! Scripted in-memory network for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use super::network::{Network, NetworkError};
use crate::http::{Request, StoredResponse};

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, StoredResponse>,
    failing: HashSet<String>,
    offline: bool,
    delay: Option<Duration>,
    calls: Vec<String>,
}

/// A `Network` that answers from a route table and records every call.
///
/// Unknown URLs answer 404, like a real static host would.
#[derive(Debug, Default)]
pub struct MockNetwork {
    state: Mutex<MockState>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer `url` with `status` and a text body.
    pub fn serve(&self, url: &str, status: u16, body: &str) -> &Self {
        let response = StoredResponse {
            status,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: Bytes::from(body.to_string()),
        };
        self.state().routes.insert(url.to_string(), response);
        self
    }

    /// Make fetches of `url` fail at the transport level.
    pub fn fail(&self, url: &str) -> &Self {
        self.state().failing.insert(url.to_string());
        self
    }

    /// Undo `fail` for `url`.
    pub fn recover(&self, url: &str) -> &Self {
        self.state().failing.remove(url);
        self
    }

    /// Fail every fetch while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Delay every answer, so callers can observe who waits on the network.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.state().calls.iter().filter(|call| call.as_str() == url).count()
    }
}

#[async_trait::async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<StoredResponse, NetworkError> {
        let url = request.url.to_string();
        let delay = {
            let mut state = self.state();
            state.calls.push(url.clone());
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.offline || state.failing.contains(&url) {
            return Err(NetworkError::Unreachable(url));
        }
        Ok(state
            .routes
            .get(&url)
            .cloned()
            .unwrap_or_else(|| StoredResponse::text(404, "Not Found")))
    }
}
