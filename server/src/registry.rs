//! WebSocket connection registry with heartbeat, replacement, and
//! spectator support.
//!
//! Each connection owns a bounded outbound queue drained by its socket's
//! writer task, so a slow client can never block a broadcast (or the table
//! lock a broadcast runs under). Dropping the queue sender closes the
//! writer, which closes the socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::models::WsMessage;
use crate::unix_now;

/// Seconds a connection may go without a pong before it is reaped.
pub const HEARTBEAT_TIMEOUT: f64 = 30.0;
/// Seconds between server pings.
pub const HEARTBEAT_INTERVAL: u64 = 15;
/// Outbound frames buffered per socket before the connection is dropped.
const SEND_QUEUE_DEPTH: usize = 64;

struct Conn {
    conn_id: u64,
    tx: mpsc::Sender<String>,
    last_pong: f64,
}

impl Conn {
    /// Queue a frame, returning false when the client is gone or so far
    /// behind that its queue is full.
    fn send(&self, text: &str) -> bool {
        self.tx.try_send(text.to_string()).is_ok()
    }
}

#[derive(Default)]
struct RegistryInner {
    /// code -> player_id -> connection
    players: HashMap<String, HashMap<String, Conn>>,
    /// code -> spectator connections
    spectators: HashMap<String, Vec<Conn>>,
}

/// Tracks every live socket per game room.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Connect / disconnect
    // ------------------------------------------------------------------

    /// Register a player connection, replacing (and thereby closing) any
    /// previous connection for the same player id. Returns the connection
    /// id and the receiving end of the outbound queue.
    pub fn connect_player(
        &self,
        code: &str,
        player_id: &str,
        now: f64,
    ) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let conn_id = self.next_id();
        let mut inner = self.inner.lock().unwrap();
        let room = inner.players.entry(code.to_string()).or_default();
        if room
            .insert(
                player_id.to_string(),
                Conn {
                    conn_id,
                    tx,
                    last_pong: now,
                },
            )
            .is_some()
        {
            tracing::info!(code, player_id, "replaced stale connection");
        }
        (conn_id, rx)
    }

    /// Remove a player connection, but only when `conn_id` still matches -
    /// a reconnect may already have replaced it.
    pub fn disconnect_player(&self, code: &str, player_id: &str, conn_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(room) = inner.players.get_mut(code) {
            if room.get(player_id).is_some_and(|c| c.conn_id == conn_id) {
                room.remove(player_id);
            }
            if room.is_empty() {
                inner.players.remove(code);
            }
        }
    }

    pub fn connect_spectator(&self, code: &str, now: f64) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let conn_id = self.next_id();
        let mut inner = self.inner.lock().unwrap();
        inner
            .spectators
            .entry(code.to_string())
            .or_default()
            .push(Conn {
                conn_id,
                tx,
                last_pong: now,
            });
        (conn_id, rx)
    }

    pub fn disconnect_spectator(&self, code: &str, conn_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conns) = inner.spectators.get_mut(code) {
            conns.retain(|c| c.conn_id != conn_id);
            if conns.is_empty() {
                inner.spectators.remove(code);
            }
        }
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    pub fn send_to_player(&self, code: &str, player_id: &str, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(room) = inner.players.get_mut(code) {
            let dead = room
                .get(player_id)
                .is_some_and(|conn| !conn.send(text));
            if dead {
                tracing::warn!(code, player_id, "dropping unresponsive connection");
                room.remove(player_id);
            }
        }
    }

    pub fn send_to_spectators(&self, code: &str, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conns) = inner.spectators.get_mut(code) {
            conns.retain(|conn| conn.send(text));
        }
    }

    /// Send a frame to every player and spectator in a room, dropping
    /// connections whose queues reject it.
    pub fn broadcast(&self, code: &str, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(room) = inner.players.get_mut(code) {
            let dead: Vec<String> = room
                .iter()
                .filter(|(_, conn)| !conn.send(text))
                .map(|(pid, _)| pid.clone())
                .collect();
            for pid in dead {
                tracing::warn!(code, player_id = %pid, "dropping unresponsive connection");
                room.remove(&pid);
            }
        }
        if let Some(conns) = inner.spectators.get_mut(code) {
            conns.retain(|conn| conn.send(text));
        }
    }

    // ------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------

    pub fn record_player_pong(&self, code: &str, player_id: &str, now: f64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.players.get_mut(code).and_then(|r| r.get_mut(player_id)) {
            conn.last_pong = now;
        }
    }

    pub fn record_spectator_pong(&self, code: &str, conn_id: u64, now: f64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner
            .spectators
            .get_mut(code)
            .and_then(|conns| conns.iter_mut().find(|c| c.conn_id == conn_id))
        {
            conn.last_pong = now;
        }
    }

    /// Drop every connection that has not ponged within the timeout.
    /// Dropping the queue sender ends the writer task, which closes the
    /// socket; the read loop then runs its normal cleanup.
    pub fn reap_stale(&self, now: f64) {
        let mut inner = self.inner.lock().unwrap();
        for (code, room) in inner.players.iter_mut() {
            let stale: Vec<String> = room
                .iter()
                .filter(|(_, c)| now - c.last_pong > HEARTBEAT_TIMEOUT)
                .map(|(pid, _)| pid.clone())
                .collect();
            for pid in stale {
                tracing::info!(code = %code, player_id = %pid, "reaping stale connection");
                room.remove(&pid);
            }
        }
        for conns in inner.spectators.values_mut() {
            conns.retain(|c| now - c.last_pong <= HEARTBEAT_TIMEOUT);
        }
        inner.players.retain(|_, room| !room.is_empty());
        inner.spectators.retain(|_, conns| !conns.is_empty());
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn connected_player_ids(&self, code: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .players
            .get(code)
            .map(|room| room.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn spectator_count(&self, code: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .spectators
            .get(code)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn active_codes(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut codes: Vec<String> = inner
            .players
            .keys()
            .chain(inner.spectators.keys())
            .cloned()
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    pub fn connection_info(&self, code: &str) -> WsMessage {
        WsMessage::ConnectionInfo {
            connected_players: self.connected_player_ids(code),
            spectator_count: self.spectator_count(code),
        }
    }
}

/// Periodic heartbeat: ping every room, then reap connections that missed
/// their pong window.
pub async fn run_heartbeat(registry: Arc<ConnectionRegistry>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL));
    loop {
        interval.tick().await;
        let now = unix_now();
        let ping = serde_json::to_string(&WsMessage::Ping { ts: now })
            .expect("ping message serializes");
        for code in registry.active_codes() {
            registry.broadcast(&code, &ping);
        }
        registry.reap_stale(now);
    }
}
