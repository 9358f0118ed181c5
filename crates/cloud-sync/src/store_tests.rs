use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex as TokioMutex;

use matchops_core::auth::{
    AuthMode, AuthService, AuthSession, AuthStateListener, AuthUser,
};
use matchops_core::connectivity::Connectivity;
use matchops_core::model::{AppState, GameStatus, NewPlayer, Player};
use matchops_core::{DataStore, Result, StoreError};

use crate::client::CloudClient;
use crate::rows::{GameRow, PlayerRow};
use crate::store::RemoteDataStore;

struct StaticAuth {
    user: AuthUser,
}

impl StaticAuth {
    fn new(user_id: &str) -> Self {
        Self {
            user: AuthUser {
                id: user_id.to_string(),
                email: Some("coach@example.com".to_string()),
                is_anonymous: false,
                display_name: None,
            },
        }
    }
}

#[async_trait]
impl AuthService for StaticAuth {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn mode(&self) -> AuthMode {
        AuthMode::Cloud
    }

    async fn current_user(&self) -> Result<Option<AuthUser>> {
        Ok(Some(self.user.clone()))
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Ok(self.user.clone())
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Ok(self.user.clone())
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn session(&self) -> Result<Option<AuthSession>> {
        Ok(Some(AuthSession {
            access_token: "test-token".to_string(),
            expires_at: None,
            user: self.user.clone(),
        }))
    }

    async fn refresh_session(&self) -> Result<Option<AuthSession>> {
        self.session().await
    }

    fn on_auth_state_change(&self, listener: AuthStateListener) {
        listener(Some(self.user.clone()));
    }
}

#[derive(Debug, Clone)]
struct MockResponse {
    status: u16,
    body: String,
}

fn ok(body: impl Into<String>) -> MockResponse {
    MockResponse {
        status: 200,
        body: body.into(),
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<()> {
    let mut buffer = Vec::new();
    loop {
        let mut chunk = [0_u8; 2048];
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..pos]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.trim().eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            let mut body_read = buffer.len() - (pos + 4);
            while body_read < content_length {
                let mut chunk = [0_u8; 2048];
                let read = stream.read(&mut chunk).await.ok()?;
                if read == 0 {
                    break;
                }
                body_read += read;
            }
            return Some(());
        }
    }
}

async fn write_http_response(
    stream: &mut tokio::net::TcpStream,
    response: &MockResponse,
) -> std::io::Result<()> {
    let payload = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        status_text(response.status),
        response.body.len(),
        response.body
    );
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await
}

/// Serves scripted responses in order, counting the requests it saw.
async fn start_mock_server(
    responses: Vec<MockResponse>,
) -> (String, Arc<TokioMutex<usize>>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(TokioMutex::new(0usize));
    let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
    let seen_clone = Arc::clone(&seen);

    let handle = tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(value) => value,
                Err(_) => break,
            };
            if read_http_request(&mut stream).await.is_none() {
                continue;
            }
            *seen_clone.lock().await += 1;
            let response = scripted.lock().await.pop_front().unwrap_or(MockResponse {
                status: 500,
                body: r#"{"message":"unexpected request"}"#.to_string(),
            });
            let _ = write_http_response(&mut stream, &response).await;
        }
    });

    (format!("http://{addr}"), seen, handle)
}

fn store_against(base_url: &str, connectivity: Connectivity) -> RemoteDataStore {
    RemoteDataStore::new(
        CloudClient::new(base_url, "anon-key"),
        Arc::new(StaticAuth::new("user1")),
        connectivity,
    )
}

fn sample_game(id: &str, version: i64) -> AppState {
    AppState {
        id: id.to_string(),
        team_name: "Eagles".into(),
        opponent_name: "Rovers".into(),
        game_date: "2026-05-01".into(),
        home_score: 1,
        away_score: 0,
        current_period: 2,
        game_status: GameStatus::InProgress,
        game_events: vec![],
        available_players: vec![],
        players_on_field: vec![],
        selected_player_ids: vec![],
        period_duration_minutes: 25,
        number_of_periods: 2,
        season_id: String::new(),
        tournament_id: String::new(),
        tournament_level: None,
        final_placement: None,
        game_personnel: vec![],
        game_notes: None,
        version,
        created_at: "2026-05-01T10:00:00Z".into(),
        updated_at: "2026-05-01T10:00:00Z".into(),
    }
}

fn game_row_body(id: &str, version: i64) -> String {
    let row = GameRow::from_domain(&sample_game(id, version), "user1").unwrap();
    serde_json::to_string(&vec![row]).unwrap()
}

fn player_row_body(player: &Player) -> String {
    let row = PlayerRow::from_domain(player, "user1");
    serde_json::to_string(&vec![row]).unwrap()
}

fn sample_player(id: &str) -> Player {
    Player {
        id: id.to_string(),
        name: "Alice".into(),
        nickname: None,
        jersey_number: Some("9".into()),
        is_goalie: false,
        received_fair_play_card: false,
        color: None,
        notes: None,
        created_at: "2026-05-01T10:00:00Z".into(),
        updated_at: "2026-05-01T10:00:00Z".into(),
    }
}

#[tokio::test]
async fn operations_before_initialize_fail_with_not_initialized() {
    let store = store_against("http://127.0.0.1:9", Connectivity::online());
    let err = store.get_players().await.unwrap_err();
    assert_eq!(err.code(), "NOT_INITIALIZED");
}

#[tokio::test]
async fn offline_operations_fail_with_network_before_any_request() {
    let (base_url, seen, server) = start_mock_server(vec![]).await;
    let connectivity = Connectivity::online();
    let store = store_against(&base_url, connectivity.clone());
    store.initialize().await.unwrap();

    connectivity.set_online(false);
    let err = store.get_players().await.unwrap_err();
    assert_eq!(err.code(), "NETWORK");
    assert_eq!(*seen.lock().await, 0);

    server.abort();
}

#[tokio::test]
async fn create_player_retries_transient_server_error() {
    let (base_url, seen, server) = start_mock_server(vec![
        MockResponse {
            status: 500,
            body: r#"{"message":"please retry"}"#.to_string(),
        },
        MockResponse {
            status: 201,
            body: player_row_body(&sample_player("player_1")),
        },
    ])
    .await;

    let store = store_against(&base_url, Connectivity::online());
    store.initialize().await.unwrap();

    let player = store
        .create_player(NewPlayer {
            name: "Alice".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(player.name, "Alice");
    assert_eq!(*seen.lock().await, 2);

    server.abort();
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let (base_url, seen, server) = start_mock_server(vec![MockResponse {
        status: 401,
        body: r#"{"message":"JWT expired"}"#.to_string(),
    }])
    .await;

    let store = store_against(&base_url, Connectivity::online());
    store.initialize().await.unwrap();

    let err = store
        .create_player(NewPlayer {
            name: "Alice".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AUTH");
    assert_eq!(*seen.lock().await, 1);

    server.abort();
}

#[tokio::test]
async fn save_game_version_race_surfaces_conflict_with_server_backup() {
    // Scripted: version fetch (v3), conditional update matching no rows,
    // backup fetch of the winning server state.
    let (base_url, seen, server) = start_mock_server(vec![
        ok(game_row_body("game_1", 3)),
        ok("[]"),
        ok(game_row_body("game_1", 4)),
    ])
    .await;

    let store = store_against(&base_url, Connectivity::online());
    store.initialize().await.unwrap();

    let err = store
        .save_game("game_1", sample_game("game_1", 3))
        .await
        .unwrap_err();
    match err {
        StoreError::Conflict {
            game_id,
            server_state,
        } => {
            assert_eq!(game_id, "game_1");
            let backup = server_state.expect("backup payload");
            assert_eq!(backup["version"], 4);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(*seen.lock().await, 3);

    server.abort();
}

#[tokio::test]
async fn save_game_success_advances_cached_version() {
    let (base_url, _seen, server) = start_mock_server(vec![
        ok(game_row_body("game_1", 3)),
        ok(game_row_body("game_1", 4)),
        // Second save: no version fetch (cache hit), straight to update.
        ok(game_row_body("game_1", 5)),
    ])
    .await;

    let store = store_against(&base_url, Connectivity::online());
    store.initialize().await.unwrap();

    let saved = store
        .save_game("game_1", sample_game("game_1", 3))
        .await
        .unwrap();
    assert_eq!(saved.version, 4);

    let saved = store
        .save_game("game_1", sample_game("game_1", 4))
        .await
        .unwrap();
    assert_eq!(saved.version, 5);

    server.abort();
}

#[tokio::test]
async fn timer_state_is_a_remote_no_op() {
    let (base_url, seen, server) = start_mock_server(vec![]).await;
    let store = store_against(&base_url, Connectivity::online());
    store.initialize().await.unwrap();

    assert!(store.get_timer_state().await.unwrap().is_none());
    store
        .save_timer_state(matchops_core::model::TimerState {
            game_id: "game_1".into(),
            time_elapsed_in_seconds: 1,
            timestamp: 2,
            was_running: None,
        })
        .await
        .unwrap();
    store.clear_timer_state().await.unwrap();
    assert_eq!(*seen.lock().await, 0);

    server.abort();
}
