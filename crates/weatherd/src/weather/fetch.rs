use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::trace;

/// Status codes treated as a completed round trip. Anything else is an
/// application-level failure even though the transport succeeded.
pub const ACCEPTED_STATUS: [u16; 2] = [200, 404];

/// Where and how to fetch one target's observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub url: String,

    /// Sent as the `appid` query parameter when present
    pub api_key: Option<String>,

    pub timeout: Duration,
}

/// Body and status of one completed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("unexpected HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },
}

/// Trait for fetching raw observations
///
/// This trait allows for mocking the transport for testing purposes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform exactly one request for `params`. Timeouts are final: no retry.
    async fn fetch(&self, params: &FetchParams) -> Result<RawResponse, FetchError>;
}

/// HTTP fetcher using reqwest
///
/// Holds a single permit, so concurrent callers sharing one instance are
/// serialized and at most one request is outstanding at a time.
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Semaphore,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("weatherd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            in_flight: Semaphore::new(1),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<RawResponse, FetchError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| FetchError::Network {
                message: e.to_string(),
            })?;

        debug!("GET {}", params.url);

        let mut request = self.client.get(&params.url).timeout(params.timeout);
        if let Some(api_key) = &params.api_key {
            request = request.query(&[("appid", api_key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, params.timeout))?;

        let status = response.status();
        if !ACCEPTED_STATUS.contains(&status.as_u16()) {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, params.timeout))?;

        trace!("{} -> {} ({} bytes)", params.url, status, body.len());

        Ok(RawResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout { after: timeout }
    } else {
        FetchError::Network {
            message: error.to_string(),
        }
    }
}

/// Mock fetcher for testing
///
/// Responses are scripted per URL and handed out in order. A URL with no
/// scripted response left fails with a network error.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: std::sync::Mutex<
        std::collections::HashMap<
            String,
            std::collections::VecDeque<Result<RawResponse, FetchError>>,
        >,
    >,
    pub calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`
    pub fn push(&self, url: &str, response: Result<RawResponse, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a 200 response with `body` for `url`
    pub fn push_ok(&self, url: &str, body: &str) {
        self.push(
            url,
            Ok(RawResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            }),
        );
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<RawResponse, FetchError> {
        self.calls.lock().unwrap().push(params.url.clone());
        self.responses
            .lock()
            .unwrap()
            .get_mut(&params.url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(FetchError::Network {
                    message: format!("no scripted response for {}", params.url),
                })
            })
    }
}
