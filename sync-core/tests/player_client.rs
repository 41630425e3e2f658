//! PlayerClient against a mocked local player API

use pairsync_core::config::PlayerEndpoint;
use pairsync_core::player::{Player, PlayerClient, PlayerError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, token: Option<&str>) -> PlayerClient {
    let addr = server.address();
    PlayerClient::new(&PlayerEndpoint {
        host: addr.ip().to_string(),
        port: addr.port(),
        token: token.map(str::to_string),
    })
    .unwrap()
}

#[tokio::test]
async fn test_snapshot_reads_song_and_queue() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/song"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videoId": "dQw4w9WgXcQ",
            "title": "Song",
            "artist": "Artist",
            "isPaused": false,
            "elapsedSeconds": 42,
            "songDuration": 213
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "videoId": "a" }, { "title": "no id" }, { "videoId": "b" }]
        })))
        .mount(&server)
        .await;

    let state = client_for(&server, None).snapshot().await.unwrap();
    assert_eq!(state.song_id.as_deref(), Some("dQw4w9WgXcQ"));
    assert_eq!(state.is_paused, Some(false));
    assert_eq!(state.queue, Some(vec!["a".to_string(), "b".to_string()]));
}

#[tokio::test]
async fn test_nothing_playing_and_no_queue() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/song"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/queue"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = client_for(&server, None).snapshot().await.unwrap();
    assert_eq!(state.song_id, None);
    assert_eq!(state.is_paused, None);
    // Unknown, not empty
    assert_eq!(state.queue, None);
}

#[tokio::test]
async fn test_commands_send_token_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/play"))
        .and(header("authorization", "Bearer player-token"))
        .and(body_json(json!({ "videoId": "xyz" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/queue/clear"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("player-token"));
    client.play_video("xyz").await.unwrap();
    client.clear_queue().await.unwrap();
}

#[tokio::test]
async fn test_rejected_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/pause"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client_for(&server, Some("wrong")).pause().await;
    assert!(matches!(result, Err(PlayerError::Unauthorized)));
}

#[tokio::test]
async fn test_player_not_running() {
    // Bind and drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = PlayerClient::new(&PlayerEndpoint {
        host: "127.0.0.1".to_string(),
        port,
        token: None,
    })
    .unwrap();

    let result = client.play().await;
    assert!(matches!(result, Err(PlayerError::NotReachable)));
}
