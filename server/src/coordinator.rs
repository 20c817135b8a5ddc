//! Table coordinator: the serialization discipline around every mutation.
//!
//! One exclusive async lock per game code. Every operation that touches a
//! table - HTTP action, timer fire, auto-deal - runs load -> mutate ->
//! store -> broadcast -> touch-activity under that lock, so all mutations
//! for a table are totally ordered and every client observes a monotone
//! sequence of states. Broadcasts go through the registry's per-socket
//! queues and never block the lock on a slow client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use sha2::{Digest, Sha256};

use homegame_shared::PlayerAction;
use homegame_table::{player_view, EngineError, TableConfig, TableEngine, TableView, SPECTATOR_ID};

use crate::models::{
    CreateGameRequest, GameMeta, GameSettings, GameStatus, JoinGameRequest, LobbyPlayer,
    LobbyState, PlayerRecord, WsMessage,
};
use crate::registry::ConnectionRegistry;
use crate::store::{GameStore, StoreError};
use crate::timer::TimerScheduler;
use crate::unix_now;

const CODE_LENGTH: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Errors surfaced to clients as `{detail}` envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Game not found")]
    GameNotFound,
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Invalid PIN")]
    InvalidPin,
    #[error("PIN must be exactly 4 digits")]
    InvalidPinFormat,
    #[error("Name must be 1-20 characters")]
    InvalidName,
    #[error("Game is not in lobby state")]
    GameNotInLobby,
    #[error("Game is full")]
    GameFull,
    #[error("Name already taken (wrong PIN)")]
    NameTaken,
    #[error("Game engine not found")]
    EngineNotFound,
    #[error("Need at least 2 players to start")]
    NotEnoughPlayers,
    #[error("Players not ready: {0}")]
    PlayersNotReady(String),
    #[error("Only the creator can {0}")]
    CreatorOnly(&'static str),
    #[error("Creator cannot leave the game")]
    CreatorCannotLeave,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn hash_pin(pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

fn verify_pin(pin: &str, pin_hash: &str) -> bool {
    constant_time_eq::constant_time_eq(hash_pin(pin).as_bytes(), pin_hash.as_bytes())
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Deal a hand with the process RNG. Kept out of the async flow so the
/// thread-local RNG never lives across an await point.
fn deal_hand(engine: &mut TableEngine, now: f64) -> Result<(), EngineError> {
    let mut rng = rand::thread_rng();
    engine.start_new_hand(now, &mut rng)
}

pub struct Coordinator {
    store: GameStore,
    registry: Arc<ConnectionRegistry>,
    timers: Arc<TimerScheduler>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        store: GameStore,
        registry: Arc<ConnectionRegistry>,
        timers: Arc<TimerScheduler>,
    ) -> Self {
        Self {
            store,
            registry,
            timers,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn timers(&self) -> &Arc<TimerScheduler> {
        &self.timers
    }

    pub fn store(&self) -> &GameStore {
        &self.store
    }

    /// The exclusive lock for one game code.
    fn lock_for(&self, code: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Lobby operations
    // ------------------------------------------------------------------

    pub async fn create_game(
        &self,
        req: &CreateGameRequest,
    ) -> Result<(String, String, LobbyState), ServerError> {
        // Re-roll on the (unlikely) code collision.
        let mut code = generate_code();
        while self.store.load_game(&code).await?.is_some() {
            code = generate_code();
        }

        let player_id = uuid::Uuid::new_v4().to_string();
        let meta = GameMeta {
            code: code.clone(),
            status: GameStatus::Lobby,
            creator_id: player_id.clone(),
            settings: req.settings.clone(),
        };
        let record = PlayerRecord {
            id: player_id.clone(),
            name: req.creator_name.clone(),
            pin_hash: hash_pin(&req.creator_pin),
            ready: false,
            connected: false,
            is_creator: true,
        };

        self.store.store_game(&code, &meta).await?;
        self.store.store_player(&code, &record).await?;
        self.store.touch_activity(&code, unix_now()).await?;

        tracing::info!(code, creator = %req.creator_name, "game created");
        let state = self.build_lobby_state(&meta).await?;
        Ok((code, player_id, state))
    }

    /// Join the lobby, or reconnect: an existing name with a matching PIN
    /// returns that player's id instead of failing.
    pub async fn join_game(
        &self,
        code: &str,
        req: &JoinGameRequest,
    ) -> Result<(String, LobbyState), ServerError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let meta = self
            .store
            .load_game(code)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        if meta.status != GameStatus::Lobby {
            return Err(ServerError::GameNotInLobby);
        }

        let players = self.store.load_all_players(code).await?;
        for p in &players {
            if p.name.eq_ignore_ascii_case(&req.player_name) {
                if verify_pin(&req.player_pin, &p.pin_hash) {
                    let state = self.build_lobby_state(&meta).await?;
                    return Ok((p.id.clone(), state));
                }
                return Err(ServerError::NameTaken);
            }
        }

        if players.len() >= meta.settings.max_players {
            return Err(ServerError::GameFull);
        }

        let player_id = uuid::Uuid::new_v4().to_string();
        let record = PlayerRecord {
            id: player_id.clone(),
            name: req.player_name.clone(),
            pin_hash: hash_pin(&req.player_pin),
            ready: false,
            connected: false,
            is_creator: false,
        };
        self.store.store_player(code, &record).await?;
        self.store.touch_activity(code, unix_now()).await?;

        let state = self.build_lobby_state(&meta).await?;
        self.broadcast_lobby(code, &state);
        Ok((player_id, state))
    }

    pub async fn leave_game(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<LobbyState, ServerError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let meta = self
            .store
            .load_game(code)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        if meta.status != GameStatus::Lobby {
            return Err(ServerError::GameNotInLobby);
        }
        self.verify_player(code, player_id, pin).await?;
        if meta.creator_id == player_id {
            return Err(ServerError::CreatorCannotLeave);
        }

        self.store.remove_player(code, player_id).await?;
        self.store.touch_activity(code, unix_now()).await?;

        let state = self.build_lobby_state(&meta).await?;
        self.broadcast_lobby(code, &state);
        Ok(state)
    }

    pub async fn toggle_ready(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<LobbyState, ServerError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let meta = self
            .store
            .load_game(code)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        if meta.status != GameStatus::Lobby {
            return Err(ServerError::GameNotInLobby);
        }
        let mut record = self.verify_player(code, player_id, pin).await?;
        record.ready = !record.ready;
        self.store.store_player(code, &record).await?;
        self.store.touch_activity(code, unix_now()).await?;

        let state = self.build_lobby_state(&meta).await?;
        self.broadcast_lobby(code, &state);
        Ok(state)
    }

    /// Creator starts the game: requires at least two players, all ready.
    /// Builds the engine, deals the first hand, and persists both.
    pub async fn start_game(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<LobbyState, ServerError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let mut meta = self
            .store
            .load_game(code)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        if meta.status != GameStatus::Lobby {
            return Err(ServerError::GameNotInLobby);
        }
        if meta.creator_id != player_id {
            return Err(ServerError::CreatorOnly("start the game"));
        }
        self.verify_player(code, player_id, pin).await?;

        let players = self.store.load_all_players(code).await?;
        if players.len() < 2 {
            return Err(ServerError::NotEnoughPlayers);
        }
        let not_ready: Vec<&str> = players
            .iter()
            .filter(|p| !p.ready)
            .map(|p| p.name.as_str())
            .collect();
        if !not_ready.is_empty() {
            return Err(ServerError::PlayersNotReady(not_ready.join(", ")));
        }

        meta.status = GameStatus::Active;
        self.store.store_game(code, &meta).await?;

        let seats: Vec<(String, String)> = players
            .iter()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();
        let mut engine = TableEngine::new(table_config(code, &meta.settings), &seats);
        let now = unix_now();
        deal_hand(&mut engine, now)?;
        self.store.store_engine(code, &engine).await?;
        self.sync_timers(code, &engine);
        self.store.touch_activity(code, now).await?;

        tracing::info!(code, players = players.len(), "game started");
        let state = self.build_lobby_state(&meta).await?;
        self.broadcast_lobby(code, &state);
        self.broadcast_engine(code, &engine);
        Ok(state)
    }

    pub async fn lobby_state(&self, code: &str) -> Result<LobbyState, ServerError> {
        let meta = self
            .store
            .load_game(code)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        self.build_lobby_state(&meta).await
    }

    pub async fn set_player_connected(
        &self,
        code: &str,
        player_id: &str,
        connected: bool,
    ) -> Result<(), ServerError> {
        if let Some(mut record) = self.store.load_player(code, player_id).await? {
            record.connected = connected;
            self.store.store_player(code, &record).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Engine operations
    // ------------------------------------------------------------------

    /// The per-player engine view, for the state endpoint and reconnects.
    pub async fn player_state(
        &self,
        code: &str,
        player_id: &str,
    ) -> Result<TableView, ServerError> {
        let engine = self
            .store
            .load_engine(code)
            .await?
            .ok_or(ServerError::EngineNotFound)?;
        Ok(player_view(&engine, player_id, unix_now()))
    }

    pub async fn process_action(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
        action: PlayerAction,
        amount: u32,
    ) -> Result<TableView, ServerError> {
        self.mutate_engine(code, player_id, pin, None, |engine, now| {
            engine.process_action(player_id, action, amount, now)
        })
        .await
    }

    /// Creator deals the next hand manually (between hands, not paused).
    pub async fn deal_next_hand(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<TableView, ServerError> {
        self.mutate_engine(
            code,
            player_id,
            pin,
            Some("deal the next hand"),
            |engine, now| {
                if engine.hand_active {
                    return Err(EngineError::HandStillActive);
                }
                if engine.paused {
                    return Err(EngineError::GamePaused);
                }
                deal_hand(engine, now)
            },
        )
        .await
    }

    pub async fn request_rebuy(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<TableView, ServerError> {
        self.mutate_engine(code, player_id, pin, None, |engine, now| {
            engine.rebuy(player_id, now)
        })
        .await
    }

    pub async fn cancel_rebuy(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<TableView, ServerError> {
        self.mutate_engine(code, player_id, pin, None, |engine, _| {
            engine.cancel_rebuy(player_id)
        })
        .await
    }

    pub async fn show_cards(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<TableView, ServerError> {
        self.mutate_engine(code, player_id, pin, None, |engine, _| {
            engine.show_cards(player_id)
        })
        .await
    }

    /// Creator toggles pause; only legal between hands.
    pub async fn toggle_pause(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<TableView, ServerError> {
        self.mutate_engine(
            code,
            player_id,
            pin,
            Some("pause the game"),
            |engine, now| {
                if engine.paused {
                    engine.unpause(now)
                } else {
                    engine.pause(now)
                }
            },
        )
        .await
    }

    /// Shared load -> authenticate -> mutate -> store -> broadcast path
    /// for authenticated engine operations.
    async fn mutate_engine<F>(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
        creator_only: Option<&'static str>,
        op: F,
    ) -> Result<TableView, ServerError>
    where
        F: FnOnce(&mut TableEngine, f64) -> Result<(), EngineError>,
    {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        if let Some(what) = creator_only {
            let meta = self
                .store
                .load_game(code)
                .await?
                .ok_or(ServerError::GameNotFound)?;
            if meta.creator_id != player_id {
                return Err(ServerError::CreatorOnly(what));
            }
        }
        self.verify_player(code, player_id, pin).await?;

        let mut engine = self
            .store
            .load_engine(code)
            .await?
            .ok_or(ServerError::EngineNotFound)?;

        let now = unix_now();
        op(&mut engine, now)?;

        self.store.store_engine(code, &engine).await?;
        self.sync_timers(code, &engine);
        self.broadcast_engine(code, &engine);
        self.store.touch_activity(code, now).await?;

        Ok(player_view(&engine, player_id, now))
    }

    async fn verify_player(
        &self,
        code: &str,
        player_id: &str,
        pin: &str,
    ) -> Result<PlayerRecord, ServerError> {
        let record = self
            .store
            .load_player(code, player_id)
            .await?
            .ok_or(ServerError::PlayerNotFound)?;
        if !verify_pin(pin, &record.pin_hash) {
            return Err(ServerError::InvalidPin);
        }
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Timer re-entry
    // ------------------------------------------------------------------

    /// A turn deadline fired. Re-verify it against the freshly loaded
    /// engine (a player action may have moved it), then auto-check when
    /// there is nothing to call, else auto-fold.
    pub async fn handle_action_timeout(&self, code: &str) -> Result<(), ServerError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let mut engine = match self.store.load_engine(code).await? {
            Some(engine) => engine,
            None => return Ok(()),
        };
        if !engine.hand_active {
            return Ok(());
        }

        let now = unix_now();
        let deadline = match engine.action_deadline {
            Some(deadline) => deadline,
            None => return Ok(()),
        };
        if now < deadline {
            // A player acted in time and the deadline moved: re-register.
            self.timers.set_action_deadline(code, Some(deadline));
            return Ok(());
        }

        let (actor_id, to_call) = {
            let actor = &engine.seats[engine.action_on_idx];
            if !actor.is_active() {
                return Ok(());
            }
            (
                actor.player_id.clone(),
                engine.current_bet - actor.bet_this_round,
            )
        };
        let action = if to_call == 0 {
            PlayerAction::Check
        } else {
            PlayerAction::Fold
        };
        tracing::info!(code, player_id = %actor_id, ?action, "turn timed out, auto-acting");

        engine.process_action(&actor_id, action, 0, now)?;
        self.store.store_engine(code, &engine).await?;
        self.sync_timers(code, &engine);
        self.broadcast_engine(code, &engine);
        self.store.touch_activity(code, now).await?;
        Ok(())
    }

    /// An auto-deal deadline fired: deal the next hand unless the table
    /// moved on (hand active, paused, finished, or deadline reset).
    pub async fn handle_auto_deal(&self, code: &str) -> Result<(), ServerError> {
        let lock = self.lock_for(code);
        let _guard = lock.lock().await;

        let mut engine = match self.store.load_engine(code).await? {
            Some(engine) => engine,
            None => return Ok(()),
        };
        if engine.hand_active || engine.paused || engine.game_over {
            return Ok(());
        }

        let now = unix_now();
        match engine.auto_deal_deadline {
            None => return Ok(()),
            Some(deadline) if now < deadline => {
                self.timers.set_auto_deal_deadline(code, Some(deadline));
                return Ok(());
            }
            Some(_) => {}
        }

        tracing::debug!(code, "auto-dealing next hand");
        deal_hand(&mut engine, now)?;
        self.store.store_engine(code, &engine).await?;
        self.sync_timers(code, &engine);
        self.broadcast_engine(code, &engine);
        self.store.touch_activity(code, now).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Broadcasting
    // ------------------------------------------------------------------

    fn sync_timers(&self, code: &str, engine: &TableEngine) {
        self.timers
            .set_action_deadline(code, engine.action_deadline);
        self.timers
            .set_auto_deal_deadline(code, engine.auto_deal_deadline);
    }

    /// Send every connected player their own view, and spectators theirs.
    /// Runs inside the table lock so each recipient sees states in order.
    pub fn broadcast_engine(&self, code: &str, engine: &TableEngine) {
        let now = unix_now();
        for player_id in self.registry.connected_player_ids(code) {
            let view = player_view(engine, &player_id, now);
            match serde_json::to_string(&WsMessage::GameState {
                data: Box::new(view),
            }) {
                Ok(text) => self.registry.send_to_player(code, &player_id, &text),
                Err(err) => tracing::error!(code, error = %err, "view serialization failed"),
            }
        }

        if self.registry.spectator_count(code) > 0 {
            let view = player_view(engine, SPECTATOR_ID, now);
            match serde_json::to_string(&WsMessage::GameState {
                data: Box::new(view),
            }) {
                Ok(text) => self.registry.send_to_spectators(code, &text),
                Err(err) => tracing::error!(code, error = %err, "view serialization failed"),
            }
        }
    }

    pub fn broadcast_lobby(&self, code: &str, state: &LobbyState) {
        match serde_json::to_string(state) {
            Ok(text) => self.registry.broadcast(code, &text),
            Err(err) => tracing::error!(code, error = %err, "lobby serialization failed"),
        }
    }

    pub fn broadcast_connection_info(&self, code: &str) {
        let info = self.registry.connection_info(code);
        if let Ok(text) = serde_json::to_string(&info) {
            self.registry.broadcast(code, &text);
        }
    }

    async fn build_lobby_state(&self, meta: &GameMeta) -> Result<LobbyState, ServerError> {
        let players = self.store.load_all_players(&meta.code).await?;
        Ok(LobbyState {
            code: meta.code.clone(),
            status: meta.status,
            settings: meta.settings.clone(),
            players: players.iter().map(LobbyPlayer::from).collect(),
            creator_id: meta.creator_id.clone(),
        })
    }
}

fn table_config(code: &str, settings: &GameSettings) -> TableConfig {
    TableConfig {
        code: code.to_string(),
        starting_chips: settings.starting_chips,
        allow_rebuys: settings.allow_rebuys,
        max_rebuys: settings.max_rebuys,
        rebuy_cutoff_minutes: settings.rebuy_cutoff_minutes,
        turn_timeout: settings.turn_timeout,
        auto_deal_delay: if settings.auto_deal_enabled { 10 } else { 0 },
        blind_level_duration: settings.blind_level_duration,
        target_game_time: settings.target_game_time,
    }
}
