//! Route handlers of the control endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::auth::Authorized;
use super::ServerState;
use crate::peer::*;
use crate::player::PlayerError;

/// Build the router serving the peer control API
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(AUTH_PATH, post(request_token))
        .route(CONTROL_PANEL_PATH, post(control_panel))
        .route(PLAY_PATH, post(play))
        .route(PAUSE_PATH, post(pause))
        .route(QUEUE_CLEAR_PATH, post(queue_clear))
        .route(QUEUE_ADD_PATH, post(queue_add))
        .with_state(state)
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(Envelope::failure(message))).into_response()
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("Malformed body: {}", e)))
}

fn is_blank(body: &Bytes) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

fn parse_video_id(body: &Bytes) -> Result<String, Response> {
    let request: VideoRequest = parse_json(body)?;
    let video_id = request.video_id.trim();
    if video_id.is_empty() {
        return Err(bad_request("videoId must not be empty"));
    }
    Ok(video_id.to_string())
}

/// Turn the local player's answer into the response envelope
fn reply(state: &ServerState, what: &str, result: Result<(), PlayerError>) -> Response {
    match result {
        Ok(()) => (StatusCode::OK, Json(Envelope::ok(current_time_ms()))).into_response(),
        Err(e) => {
            warn!("Local player failed to {}: {}", what, e);
            state.events.error(format!("Local player failed to {}: {}", what, e));
            (StatusCode::BAD_GATEWAY, Json(Envelope::failure(e.to_string()))).into_response()
        }
    }
}

/// Forward a command from the master to the local player
async fn execute(state: &ServerState, command: PeerCommand) -> Response {
    sync_log!(state.config.get().log_debug, "Received {}", command);

    // Any authorized request means the master can reach us
    state.events.succeeded();
    state.events.command_received(&command);

    let player = &state.player;
    let result = match &command {
        PeerCommand::PlayVideo(id) => player.play_video(id).await,
        PeerCommand::Play => player.play().await,
        PeerCommand::Pause => player.pause().await,
        PeerCommand::QueueClear => player.clear_queue().await,
        PeerCommand::QueueAdd(id) => player.add_to_queue(id).await,
    };
    reply(state, &command.to_string(), result)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: current_time_ms(),
    })
}

async fn request_token(State(state): State<ServerState>, body: Bytes) -> Response {
    let allowed = state
        .config
        .get()
        .role
        .slave()
        .map(|s| s.allow_token_requests)
        .unwrap_or(false);
    if !allowed {
        warn!("Refused token request, token requests are disabled");
        return (
            StatusCode::FORBIDDEN,
            Json(Envelope::failure("Token requests are disabled")),
        )
            .into_response();
    }

    let name = if is_blank(&body) {
        "unnamed".to_string()
    } else {
        match parse_json::<TokenRequest>(&body) {
            Ok(request) => request.name,
            Err(response) => return response,
        }
    };

    let access_token = state.tokens.issue();
    info!("Issued token to {}", name);
    Json(TokenResponse { access_token }).into_response()
}

async fn control_panel(
    _auth: Authorized,
    State(state): State<ServerState>,
    body: Bytes,
) -> Response {
    let request: ControlPanelRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match request.action {
        ControlAction::Play => execute(&state, PeerCommand::Play).await,
        ControlAction::Pause => execute(&state, PeerCommand::Pause).await,
        ControlAction::TogglePlay => {
            sync_log!(state.config.get().log_debug, "Received toggle-play");
            state.events.succeeded();
            let result = state.player.toggle_play().await;
            reply(&state, "toggle playback", result)
        }
    }
}

/// No body resumes playback, `{videoId}` switches songs
async fn play(_auth: Authorized, State(state): State<ServerState>, body: Bytes) -> Response {
    let command = if is_blank(&body) {
        PeerCommand::Play
    } else {
        match parse_video_id(&body) {
            Ok(id) => PeerCommand::PlayVideo(id),
            Err(response) => return response,
        }
    };
    execute(&state, command).await
}

async fn pause(_auth: Authorized, State(state): State<ServerState>) -> Response {
    execute(&state, PeerCommand::Pause).await
}

async fn queue_clear(_auth: Authorized, State(state): State<ServerState>) -> Response {
    execute(&state, PeerCommand::QueueClear).await
}

async fn queue_add(_auth: Authorized, State(state): State<ServerState>, body: Bytes) -> Response {
    match parse_video_id(&body) {
        Ok(id) => execute(&state, PeerCommand::QueueAdd(id)).await,
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, SlaveConfig, SyncConfig, SyncRole};
    use crate::server::TokenRegistry;
    use crate::sync::{ConnectionStatus, SyncEvents};
    use crate::testing::{MockPlayer, PlayerCall, RecordingCallback};
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        player: Arc<MockPlayer>,
        events: Arc<SyncEvents>,
        tokens: Arc<TokenRegistry>,
        recorder: Arc<RecordingCallback>,
    }

    fn fixture(allow_token_requests: bool) -> Fixture {
        let config = SyncConfig {
            enabled: true,
            role: SyncRole::Slave(SlaveConfig {
                auth_token: Some("secret".to_string()),
                allow_token_requests,
                ..SlaveConfig::default()
            }),
            ..SyncConfig::default()
        };
        let player = Arc::new(MockPlayer::new());
        let events = Arc::new(SyncEvents::new());
        let recorder = Arc::new(RecordingCallback::default());
        events.set_callback(recorder.clone());
        let tokens = Arc::new(TokenRegistry::new());

        let state = ServerState {
            player: player.clone(),
            config: Arc::new(ConfigStore::new(config)),
            tokens: tokens.clone(),
            events: events.clone(),
        };
        Fixture {
            app: router(state),
            player,
            events,
            tokens,
            recorder,
        }
    }

    fn post(path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let f = fixture(false);
        let request = Request::builder()
            .uri(HEALTH_PATH)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_missing_and_unknown_tokens() {
        let f = fixture(false);

        let (status, body) = send(&f.app, post(PAUSE_PATH, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&f.app, post(PAUSE_PATH, Some("wrong"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert!(f.player.calls().is_empty());
        assert_eq!(f.events.status().current(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_play_with_and_without_video() {
        let f = fixture(false);

        let (status, body) = send(
            &f.app,
            post(PLAY_PATH, Some("secret"), Some(json!({ "videoId": "abc" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = send(&f.app, post(PLAY_PATH, Some("secret"), None)).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(
            f.player.calls(),
            vec![PlayerCall::PlayVideo("abc".to_string()), PlayerCall::Play]
        );
        assert_eq!(f.events.status().current(), ConnectionStatus::Connected);
        assert_eq!(
            f.recorder.commands(),
            vec![PeerCommand::PlayVideo("abc".to_string()), PeerCommand::Play]
        );
    }

    #[tokio::test]
    async fn test_queue_routes() {
        let f = fixture(false);

        send(&f.app, post(QUEUE_CLEAR_PATH, Some("secret"), None)).await;
        send(
            &f.app,
            post(QUEUE_ADD_PATH, Some("secret"), Some(json!({ "videoId": "x" }))),
        )
        .await;

        assert_eq!(
            f.player.calls(),
            vec![PlayerCall::ClearQueue, PlayerCall::AddToQueue("x".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let f = fixture(false);

        let request = Request::builder()
            .method("POST")
            .uri(QUEUE_ADD_PATH)
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some());

        let (status, _) = send(
            &f.app,
            post(QUEUE_ADD_PATH, Some("secret"), Some(json!({ "videoId": "" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(f.player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_player_failure_is_bad_gateway() {
        let f = fixture(false);
        f.player.fail_commands(true);

        let (status, body) = send(&f.app, post(PAUSE_PATH, Some("secret"), None)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(f.recorder.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_control_panel_actions() {
        let f = fixture(false);

        for action in ["play", "pause", "toggle-play"] {
            let (status, _) = send(
                &f.app,
                post(CONTROL_PANEL_PATH, Some("secret"), Some(json!({ "action": action }))),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = send(
            &f.app,
            post(CONTROL_PANEL_PATH, Some("secret"), Some(json!({ "action": "skip" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(
            f.player.calls(),
            vec![PlayerCall::Play, PlayerCall::Pause, PlayerCall::TogglePlay]
        );
    }

    #[tokio::test]
    async fn test_token_requests_disabled() {
        let f = fixture(false);
        let (status, _) = send(
            &f.app,
            post(AUTH_PATH, None, Some(json!({ "name": "master" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(f.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_issued_token_is_accepted() {
        let f = fixture(true);
        let (status, body) = send(
            &f.app,
            post(AUTH_PATH, None, Some(json!({ "name": "master" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let token = body["accessToken"].as_str().unwrap().to_string();
        assert_eq!(token.len(), crate::server::TOKEN_LENGTH);

        let (status, _) = send(&f.app, post(PAUSE_PATH, Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
