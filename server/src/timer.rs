//! Timer scheduler: one process-wide loop firing per-table deadlines.
//!
//! Tracks turn timeouts and auto-deal deadlines in two in-memory maps.
//! Expired entries re-enter the engine through the coordinator, under the
//! same per-table lock as player actions; after loading the engine the
//! deadline is verified again so a timer fire can never double-act a turn
//! that a player action already resolved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::coordinator::Coordinator;
use crate::unix_now;

/// Seconds between scheduler ticks.
const TICK_INTERVAL: u64 = 1;

/// In-memory deadline maps, fed by the coordinator after every mutation.
#[derive(Default)]
pub struct TimerScheduler {
    action_deadlines: Mutex<HashMap<String, f64>>,
    auto_deal_deadlines: Mutex<HashMap<String, f64>>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or clear) the turn deadline for a game.
    pub fn set_action_deadline(&self, code: &str, deadline: Option<f64>) {
        let mut map = self.action_deadlines.lock().unwrap();
        match deadline {
            Some(at) if at > 0.0 => {
                map.insert(code.to_string(), at);
            }
            _ => {
                map.remove(code);
            }
        }
    }

    /// Register (or clear) the auto-deal deadline for a game.
    pub fn set_auto_deal_deadline(&self, code: &str, deadline: Option<f64>) {
        let mut map = self.auto_deal_deadlines.lock().unwrap();
        match deadline {
            Some(at) if at > 0.0 => {
                map.insert(code.to_string(), at);
            }
            _ => {
                map.remove(code);
            }
        }
    }

    pub fn clear(&self, code: &str) {
        self.action_deadlines.lock().unwrap().remove(code);
        self.auto_deal_deadlines.lock().unwrap().remove(code);
    }

    fn take_expired(map: &Mutex<HashMap<String, f64>>, now: f64) -> Vec<String> {
        let mut map = map.lock().unwrap();
        let expired: Vec<String> = map
            .iter()
            .filter(|(_, &deadline)| now >= deadline)
            .map(|(code, _)| code.clone())
            .collect();
        for code in &expired {
            map.remove(code);
        }
        expired
    }

    pub fn take_expired_actions(&self, now: f64) -> Vec<String> {
        Self::take_expired(&self.action_deadlines, now)
    }

    pub fn take_expired_auto_deals(&self, now: f64) -> Vec<String> {
        Self::take_expired(&self.auto_deal_deadlines, now)
    }
}

/// The scheduler loop. Errors are logged and swallowed; the next tick only
/// retries a deadline if the handler re-registered it.
pub async fn run(coordinator: Arc<Coordinator>) {
    let mut interval = tokio::time::interval(Duration::from_secs(TICK_INTERVAL));
    tracing::info!("timer scheduler started");
    loop {
        interval.tick().await;
        let now = unix_now();

        for code in coordinator.timers().take_expired_actions(now) {
            if let Err(err) = coordinator.handle_action_timeout(&code).await {
                tracing::warn!(code = %code, error = %err, "turn timeout handling failed");
            }
        }

        for code in coordinator.timers().take_expired_auto_deals(now) {
            if let Err(err) = coordinator.handle_auto_deal(&code).await {
                tracing::warn!(code = %code, error = %err, "auto-deal handling failed");
            }
        }
    }
}
