//! Request, response, and lobby state models.

use homegame_shared::PlayerAction;
use homegame_table::TableView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Lobby,
    Active,
    Ended,
}

/// Game settings chosen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default = "defaults::starting_chips")]
    pub starting_chips: u32,
    #[serde(default = "defaults::max_players")]
    pub max_players: usize,
    #[serde(default = "defaults::yes")]
    pub allow_rebuys: bool,
    /// 0 = unlimited.
    #[serde(default = "defaults::max_rebuys")]
    pub max_rebuys: u32,
    /// 0 = no cutoff.
    #[serde(default = "defaults::rebuy_cutoff_minutes")]
    pub rebuy_cutoff_minutes: u32,
    /// Seconds; 0 = no turn timer.
    #[serde(default)]
    pub turn_timeout: u32,
    /// Minutes per blind level.
    #[serde(default = "defaults::blind_level_duration")]
    pub blind_level_duration: u32,
    /// Hours; 0 = fixed blinds.
    #[serde(default = "defaults::target_game_time")]
    pub target_game_time: u32,
    #[serde(default = "defaults::yes")]
    pub auto_deal_enabled: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            starting_chips: defaults::starting_chips(),
            max_players: defaults::max_players(),
            allow_rebuys: true,
            max_rebuys: defaults::max_rebuys(),
            rebuy_cutoff_minutes: defaults::rebuy_cutoff_minutes(),
            turn_timeout: 0,
            blind_level_duration: defaults::blind_level_duration(),
            target_game_time: defaults::target_game_time(),
            auto_deal_enabled: true,
        }
    }
}

mod defaults {
    pub fn starting_chips() -> u32 {
        5000
    }
    pub fn max_players() -> usize {
        50
    }
    pub fn max_rebuys() -> u32 {
        1
    }
    pub fn rebuy_cutoff_minutes() -> u32 {
        60
    }
    pub fn blind_level_duration() -> u32 {
        20
    }
    pub fn target_game_time() -> u32 {
        4
    }
    pub fn yes() -> bool {
        true
    }
}

/// Lobby metadata persisted under `game:{code}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMeta {
    pub code: String,
    pub status: GameStatus,
    pub creator_id: String,
    pub settings: GameSettings,
}

/// Per-player lobby record persisted under `game:{code}:player:{id}`.
/// Carries the PIN hash; never sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub pin_hash: String,
    pub ready: bool,
    pub connected: bool,
    pub is_creator: bool,
}

/// Public-facing player information (no PIN hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub connected: bool,
    pub is_creator: bool,
}

impl From<&PlayerRecord> for LobbyPlayer {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            ready: record.ready,
            connected: record.connected,
            is_creator: record.is_creator,
        }
    }
}

/// Full lobby state sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyState {
    pub code: String,
    pub status: GameStatus,
    pub settings: GameSettings,
    pub players: Vec<LobbyPlayer>,
    pub creator_id: String,
}

// ============================================================================
// REQUEST / RESPONSE BODIES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGameRequest {
    pub creator_name: String,
    pub creator_pin: String,
    #[serde(flatten)]
    pub settings: GameSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinGameRequest {
    pub player_name: String,
    pub player_pin: String,
}

/// Body shared by every authenticated per-player operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthedRequest {
    pub player_id: String,
    pub pin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub player_id: String,
    pub pin: String,
    pub action: PlayerAction,
    #[serde(default)]
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGameResponse {
    pub code: String,
    pub player_id: String,
    pub game: LobbyState,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinGameResponse {
    pub player_id: String,
    pub game: LobbyState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

// ============================================================================
// WEBSOCKET MESSAGES
// ============================================================================

/// Server-to-client WebSocket frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    GameState { data: Box<TableView> },
    ConnectionInfo {
        connected_players: Vec<String>,
        spectator_count: usize,
    },
    Ping { ts: f64 },
}

/// Client-to-server WebSocket frames. Anything unparseable is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Pong,
}
