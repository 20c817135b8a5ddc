//! REST and WebSocket endpoints.
//!
//! The transport layer is deliberately thin: validate the request shape,
//! upcase the game code, and delegate to the coordinator. Errors become
//! `{detail}` envelopes; only a missing game on the read endpoints is 404.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tower_http::cors::CorsLayer;

use homegame_table::TableView;

use crate::coordinator::Coordinator;
use crate::models::{
    ActionRequest, AuthedRequest, CreateGameRequest, CreateGameResponse, ErrorResponse,
    JoinGameRequest, JoinGameResponse, LobbyState, WsClientMessage, WsMessage,
};
use crate::unix_now;
use crate::ServerError;

/// WebSocket close code for a game code that does not exist.
const CLOSE_GAME_NOT_FOUND: u16 = 4004;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/api/games", post(create_game))
        .route("/api/games/:code", get(get_game))
        .route("/api/games/:code/join", post(join_game))
        .route("/api/games/:code/leave", post(leave_game))
        .route("/api/games/:code/ready", post(toggle_ready))
        .route("/api/games/:code/start", post(start_game))
        .route("/api/games/:code/action", post(process_action))
        .route("/api/games/:code/deal", post(deal_next_hand))
        .route("/api/games/:code/rebuy", post(request_rebuy))
        .route("/api/games/:code/cancel_rebuy", post(cancel_rebuy))
        .route("/api/games/:code/show_cards", post(show_cards))
        .route("/api/games/:code/pause", post(toggle_pause))
        .route("/api/games/:code/state/:player_id", get(player_state))
        .route("/ws/:code/:player_id", get(ws_endpoint))
        .layer(CorsLayer::permissive())
        .with_state(coordinator)
}

fn validate_pin(pin: &str) -> Result<(), ServerError> {
    if pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ServerError::InvalidPinFormat)
    }
}

fn validate_name(name: &str) -> Result<(), ServerError> {
    if name.is_empty() || name.chars().count() > 20 {
        return Err(ServerError::InvalidName);
    }
    Ok(())
}

// ---------- REST handlers ----------

async fn create_game(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<CreateGameResponse>, ServerError> {
    validate_name(&req.creator_name)?;
    validate_pin(&req.creator_pin)?;
    let (code, player_id, game) = coordinator.create_game(&req).await?;
    Ok(Json(CreateGameResponse {
        code,
        player_id,
        game,
    }))
}

async fn get_game(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
) -> Result<Json<LobbyState>, Response> {
    match coordinator.lobby_state(&code.to_uppercase()).await {
        Ok(state) => Ok(Json(state)),
        Err(err @ ServerError::GameNotFound) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                detail: err.to_string(),
            }),
        )
            .into_response()),
        Err(err) => Err(err.into_response()),
    }
}

async fn join_game(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<JoinGameRequest>,
) -> Result<Json<JoinGameResponse>, ServerError> {
    validate_name(&req.player_name)?;
    validate_pin(&req.player_pin)?;
    let (player_id, game) = coordinator.join_game(&code.to_uppercase(), &req).await?;
    Ok(Json(JoinGameResponse { player_id, game }))
}

async fn leave_game(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<LobbyState>, ServerError> {
    let state = coordinator
        .leave_game(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(state))
}

async fn toggle_ready(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<LobbyState>, ServerError> {
    let state = coordinator
        .toggle_ready(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(state))
}

async fn start_game(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<LobbyState>, ServerError> {
    let state = coordinator
        .start_game(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(state))
}

async fn process_action(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .process_action(
            &code.to_uppercase(),
            &req.player_id,
            &req.pin,
            req.action,
            req.amount,
        )
        .await?;
    Ok(Json(view))
}

async fn deal_next_hand(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .deal_next_hand(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(view))
}

async fn request_rebuy(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .request_rebuy(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(view))
}

async fn cancel_rebuy(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .cancel_rebuy(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(view))
}

async fn show_cards(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .show_cards(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(view))
}

async fn toggle_pause(
    State(coordinator): State<Arc<Coordinator>>,
    Path(code): Path<String>,
    Json(req): Json<AuthedRequest>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .toggle_pause(&code.to_uppercase(), &req.player_id, &req.pin)
        .await?;
    Ok(Json(view))
}

async fn player_state(
    State(coordinator): State<Arc<Coordinator>>,
    Path((code, player_id)): Path<(String, String)>,
) -> Result<Json<TableView>, ServerError> {
    let view = coordinator
        .player_state(&code.to_uppercase(), &player_id)
        .await?;
    Ok(Json(view))
}

// ---------- WebSocket ----------

async fn ws_endpoint(
    State(coordinator): State<Arc<Coordinator>>,
    Path((code, player_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(coordinator, code.to_uppercase(), player_id, socket))
}

async fn handle_socket(
    coordinator: Arc<Coordinator>,
    code: String,
    player_id: String,
    mut socket: WebSocket,
) {
    // The game must exist; unknown player ids attach as spectators.
    let lobby = match coordinator.lobby_state(&code).await {
        Ok(state) => state,
        Err(_) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GAME_NOT_FOUND,
                    reason: "Game not found".into(),
                })))
                .await;
            return;
        }
    };
    let is_player = lobby.players.iter().any(|p| p.id == player_id);

    // Lobby state goes out immediately on connect.
    if let Ok(text) = serde_json::to_string(&lobby) {
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    let registry = coordinator.registry().clone();
    let now = unix_now();
    let (conn_id, mut outbound) = if is_player {
        registry.connect_player(&code, &player_id, now)
    } else {
        registry.connect_spectator(&code, now)
    };
    tracing::info!(code = %code, player_id = %player_id, spectator = !is_player, "ws connect");

    if is_player {
        if let Err(err) = coordinator.set_player_connected(&code, &player_id, true).await {
            tracing::warn!(code = %code, error = %err, "failed to mark player connected");
        }
        if let Ok(state) = coordinator.lobby_state(&code).await {
            coordinator.broadcast_lobby(&code, &state);
        }
        // Reconnects get the current table state straight away.
        if let Ok(view) = coordinator.player_state(&code, &player_id).await {
            if let Ok(text) = serde_json::to_string(&WsMessage::GameState {
                data: Box::new(view),
            }) {
                registry.send_to_player(&code, &player_id, &text);
            }
        }
    }
    coordinator.broadcast_connection_info(&code);

    let (mut sink, mut stream) = socket.split();

    // Writer task: drains this connection's queue. Ends (and closes the
    // socket) when the registry drops the sender.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Read loop: heartbeat pongs in, disconnects out.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Ok(WsClientMessage::Pong) = serde_json::from_str(&text) {
                    if is_player {
                        registry.record_player_pong(&code, &player_id, unix_now());
                    } else {
                        registry.record_spectator_pong(&code, conn_id, unix_now());
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    tracing::info!(code = %code, player_id = %player_id, spectator = !is_player, "ws disconnect");
    if is_player {
        registry.disconnect_player(&code, &player_id, conn_id);
        if let Err(err) = coordinator
            .set_player_connected(&code, &player_id, false)
            .await
        {
            tracing::warn!(code = %code, error = %err, "failed to mark player disconnected");
        }
        if let Ok(state) = coordinator.lobby_state(&code).await {
            coordinator.broadcast_lobby(&code, &state);
        }
    } else {
        registry.disconnect_spectator(&code, conn_id);
    }
    coordinator.broadcast_connection_info(&code);
    writer.abort();
}
