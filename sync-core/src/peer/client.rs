//! Peer HTTP client with retry and backoff

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::protocol::*;
use super::transport::{PeerRequest, Transport, TransportError};
use crate::config::{ConfigError, ConfigStore, MasterConfig, PeerEndpoint, SyncRole};

/// Name presented when asking the slave for a token
const TOKEN_CLIENT_NAME: &str = "pairsync-master";

/// How often and how patiently a request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure, doubled after each further one
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Errors returned by [`PeerClient`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("This instance is not configured as master")]
    NotMaster,

    #[error("Peer rejected the credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("API call failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: AttemptError,
    },

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),
}

/// Client for the slave's control API
#[derive(Clone)]
pub struct PeerClient {
    transport: Arc<dyn Transport>,
    config: Arc<ConfigStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("retry", &self.retry)
            .finish()
    }
}

impl PeerClient {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<ConfigStore>) -> Self {
        Self {
            transport,
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Current master settings, validated
    fn master_config(&self) -> Result<(MasterConfig, bool), PeerError> {
        let config = self.config.get();
        let master = config.role.master().cloned().ok_or(PeerError::NotMaster)?;
        if let Err(e) = master.validate() {
            sync_log!(config.log_debug, "Configuration error: {}", e);
            return Err(e.into());
        }
        Ok((master, config.log_debug))
    }

    /// Call an endpoint on the slave.
    ///
    /// Transport failures, unexpected statuses and malformed bodies are
    /// retried with exponential backoff. A 401/403 is never retried with the
    /// same credentials; with `auto_refresh_token` one new token is fetched
    /// and the request re-issued once.
    #[instrument(skip(self, body))]
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<Value, PeerError> {
        let (master, verbose) = self.master_config()?;
        let url = format!("{}{}", master.peer.base_url(), endpoint);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut bearer = master.token().map(str::to_string);
        let mut refreshed = false;
        let mut attempt: u32 = 0;

        loop {
            sync_log!(
                verbose,
                attempt = attempt + 1,
                max_attempts,
                "API {} {}",
                method,
                endpoint
            );

            let request = PeerRequest {
                method: method.clone(),
                url: url.clone(),
                bearer: bearer.clone(),
                body: body.clone(),
            };

            let error = match self.transport.send(request).await {
                Ok(resp) if resp.is_success() => match parse_body(&resp.body) {
                    Ok(value) => return Ok(value),
                    Err(e) => e,
                },
                Ok(resp) if resp.is_auth_failure() => {
                    if master.auto_refresh_token && !refreshed {
                        refreshed = true;
                        warn!("Slave rejected credentials (HTTP {}), requesting a new token", resp.status);
                        bearer = Some(self.refresh_token().await?);
                        continue;
                    }
                    warn!("Slave rejected credentials (HTTP {})", resp.status);
                    return Err(PeerError::Unauthorized(resp.status));
                }
                Ok(resp) => AttemptError::Status {
                    status: resp.status,
                    body: resp.body,
                },
                Err(e) => AttemptError::Transport(e),
            };

            attempt += 1;
            if attempt >= max_attempts {
                sync_log!(verbose, "API call failed after {} attempts: {}", attempt, error);
                return Err(PeerError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.retry.delay_for(attempt - 1);
            sync_log!(
                verbose,
                "API call failed (attempt {}/{}), retrying in {}ms: {}",
                attempt,
                max_attempts,
                delay.as_millis(),
                error
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Push one command to the slave
    pub async fn send(&self, command: &PeerCommand) -> Result<(), PeerError> {
        self.call(command.path(), Method::POST, command.body())
            .await
            .map(|_| ())
    }

    /// Check the slave's health endpoint (with retries)
    pub async fn health(&self) -> Result<HealthResponse, PeerError> {
        let value = self.call(HEALTH_PATH, Method::GET, None).await?;
        serde_json::from_value(value).map_err(|e| PeerError::Exhausted {
            attempts: 1,
            source: AttemptError::Malformed(e.to_string()),
        })
    }

    /// Single health probe of an arbitrary endpoint, no retries or auth.
    ///
    /// Used by the slave to check on its master.
    pub async fn probe(&self, endpoint: &PeerEndpoint) -> Result<HealthResponse, PeerError> {
        let request = PeerRequest {
            method: Method::GET,
            url: format!("{}{}", endpoint.base_url(), HEALTH_PATH),
            bearer: None,
            body: None,
        };

        let exhausted = |source: AttemptError| PeerError::Exhausted {
            attempts: 1,
            source,
        };

        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| exhausted(e.into()))?;
        if !resp.is_success() {
            return Err(exhausted(AttemptError::Status {
                status: resp.status,
                body: resp.body,
            }));
        }
        serde_json::from_str(&resp.body).map_err(|e| exhausted(AttemptError::Malformed(e.to_string())))
    }

    /// Ask the slave for a new bearer token and store it in the config
    pub async fn refresh_token(&self) -> Result<String, PeerError> {
        let master = self
            .config
            .get()
            .role
            .master()
            .cloned()
            .ok_or(PeerError::NotMaster)?;

        let body = serde_json::to_value(TokenRequest {
            name: TOKEN_CLIENT_NAME.to_string(),
        })
        .map_err(|e| PeerError::TokenRefresh(e.to_string()))?;

        let request = PeerRequest {
            method: Method::POST,
            url: format!("{}{}", master.peer.base_url(), AUTH_PATH),
            bearer: None,
            body: Some(body),
        };

        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| PeerError::TokenRefresh(e.to_string()))?;
        if !resp.is_success() {
            return Err(PeerError::TokenRefresh(format!("HTTP {}", resp.status)));
        }

        let token: TokenResponse = serde_json::from_str(&resp.body)
            .map_err(|e| PeerError::TokenRefresh(e.to_string()))?;

        self.config.update(|c| {
            if let SyncRole::Master(m) = &mut c.role {
                m.auth_token = Some(token.access_token.clone());
            }
        });
        info!("Obtained a new token from the slave");

        Ok(token.access_token)
    }
}

/// An empty body is a valid reply with no data
fn parse_body(body: &str) -> Result<Value, AttemptError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| AttemptError::Malformed(e.to_string()))
}
