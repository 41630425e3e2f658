//! Local player HTTP client

use std::time::Duration;

use axum::async_trait;
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::*;
use super::Player;
use crate::config::PlayerEndpoint;
use crate::sync::PlaybackState;

/// Connection timeout (short since it's usually localhost)
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(1);

/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors that can occur when talking to the local player
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Player is not running or not reachable")]
    NotReachable,

    #[error("Invalid player API token")]
    Unauthorized,

    #[error("Player API error: {0}")]
    Api(String),
}

/// Client for the local player's REST API
#[derive(Debug, Clone)]
pub struct PlayerClient {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

impl PlayerClient {
    /// Create a client for the given endpoint
    pub fn new(endpoint: &PlayerEndpoint) -> Result<Self, PlayerError> {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("http://{}:{}", endpoint.host, endpoint.port),
            api_token: endpoint.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    /// Build a request with optional authentication
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let mut req = self.http.request(method, &url);

        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        req
    }

    /// Send a request and map the status into a player error
    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, PlayerError> {
        let resp = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                warn!("Player not reachable: {}", e);
                PlayerError::NotReachable
            } else {
                PlayerError::Http(e)
            }
        })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PlayerError::Unauthorized),
            s if s.is_success() => Ok(resp),
            s => Err(PlayerError::Api(format!("Unexpected response (HTTP {})", s.as_u16()))),
        }
    }

    /// Get the current song (None when nothing is playing)
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn now_playing(&self) -> Result<Option<SongInfo>, PlayerError> {
        let resp = self
            .request(Method::GET, "/song")
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    PlayerError::NotReachable
                } else {
                    PlayerError::Http(e)
                }
            })?;

        if resp.status() == StatusCode::NO_CONTENT || resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(PlayerError::Unauthorized);
        }

        match resp.json::<SongInfo>().await {
            Ok(song) => Ok(Some(song)),
            Err(e) => {
                debug!("Unparseable song response, assuming nothing playing: {}", e);
                Ok(None)
            }
        }
    }

    /// Get the video ids of the play queue
    pub async fn queue(&self) -> Result<Vec<String>, PlayerError> {
        let resp: QueueResponse = self
            .execute(self.request(Method::GET, "/queue"))
            .await?
            .json()
            .await?;

        Ok(resp.video_ids())
    }
}

#[async_trait]
impl Player for PlayerClient {
    async fn snapshot(&self) -> Result<PlaybackState, PlayerError> {
        let (song, queue) = tokio::join!(self.now_playing(), self.queue());
        let song = song?;

        // The queue is optional information; a failure leaves it unknown
        let queue = match queue {
            Ok(ids) => Some(ids),
            Err(e) => {
                debug!("Queue unavailable: {}", e);
                None
            }
        };

        Ok(PlaybackState {
            song_id: song.as_ref().map(|s| s.video_id.clone()),
            is_paused: song.as_ref().and_then(|s| s.is_paused),
            queue,
        })
    }

    async fn play(&self) -> Result<(), PlayerError> {
        self.execute(self.request(Method::POST, "/play")).await?;
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.execute(self.request(Method::POST, "/pause")).await?;
        Ok(())
    }

    async fn toggle_play(&self) -> Result<(), PlayerError> {
        self.execute(self.request(Method::POST, "/toggle-play")).await?;
        Ok(())
    }

    async fn play_video(&self, video_id: &str) -> Result<(), PlayerError> {
        self.execute(self.request(Method::POST, "/play").json(&VideoRequest {
            video_id: video_id.to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn clear_queue(&self) -> Result<(), PlayerError> {
        self.execute(self.request(Method::POST, "/queue/clear")).await?;
        Ok(())
    }

    async fn add_to_queue(&self, video_id: &str) -> Result<(), PlayerError> {
        self.execute(self.request(Method::POST, "/queue/add").json(&VideoRequest {
            video_id: video_id.to_string(),
        }))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PlayerClient::new(&PlayerEndpoint::default()).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9863");
        assert_eq!(client.api_token, None);

        let endpoint = PlayerEndpoint {
            token: Some("test-token".to_string()),
            ..PlayerEndpoint::default()
        };
        let client = PlayerClient::new(&endpoint).unwrap();
        assert_eq!(client.api_token, Some("test-token".to_string()));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let endpoint = PlayerEndpoint {
            token: Some("  ".to_string()),
            ..PlayerEndpoint::default()
        };
        let client = PlayerClient::new(&endpoint).unwrap();
        assert_eq!(client.api_token, None);
    }

    #[test]
    fn test_queue_ids_skip_missing() {
        let resp: QueueResponse = serde_json::from_str(
            r#"{"items":[{"videoId":"a"},{"title":"no id"},{"videoId":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.video_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
