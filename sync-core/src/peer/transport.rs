//! Transport used to reach the peer

use std::time::Duration;

use axum::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use thiserror::Error;

/// Connection timeout for the peer (it is on the LAN, not localhost)
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Request timeout for the peer
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to get any HTTP response at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection refused ({0})")]
    Connect(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Network error ({0})")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// One request to the peer
#[derive(Debug, Clone)]
pub struct PeerRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// Raw reply from the peer
#[derive(Debug, Clone)]
pub struct PeerResponse {
    pub status: u16,
    pub body: String,
}

impl PeerResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// Sends a single request, without retries
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PeerRequest) -> Result<PeerResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PeerRequest) -> Result<PeerResponse, TransportError> {
        let mut req = self.http.request(request.method, &request.url);

        if let Some(token) = &request.bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Other(format!("could not read response body: {}", e)))?;

        Ok(PeerResponse { status, body })
    }
}
