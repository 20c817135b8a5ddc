//! Homegame - Table Engine
//!
//! The deterministic state machine for a single poker table, the blind
//! schedule builder, and the per-recipient view projector. The engine owns
//! its state exclusively; persistence and sockets live a layer up.

use serde::{Deserialize, Serialize};

pub mod blinds;
pub mod engine;
pub mod state;
pub mod view;

pub use engine::TableEngine;
pub use state::{
    ActionRecord, Elimination, HandHistory, HandResult, PlayerHandRecord, PlayerState,
    RefundRecord, Standing, ValidAction, WinnerRecord,
};
pub use view::{player_view, TableView, SPECTATOR_ID};

/// Table errors surfaced to players. The message text is what the UI shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("No active hand")]
    NoActiveHand,
    #[error("Player cannot act")]
    PlayerCannotAct,
    #[error("Cannot check, must call or fold")]
    CannotCheck,
    #[error("Raise must be at least {min}")]
    MustMeetMinRaise { min: u32 },
    #[error("Rebuys are not allowed")]
    RebuysDisabled,
    #[error("Player still has chips")]
    NotBusted,
    #[error("Maximum rebuys ({max}) reached")]
    MaxRebuysReached { max: u32 },
    #[error("Rebuy window has closed ({minutes} min)")]
    CutoffPassed { minutes: u32 },
    #[error("Rebuy already queued")]
    AlreadyQueued,
    #[error("No rebuy queued")]
    NoRebuyQueued,
    #[error("Hand is still active")]
    HandStillActive,
    #[error("No cards to show")]
    NoCardsToShow,
    #[error("Game is already paused")]
    AlreadyPaused,
    #[error("Game is not paused")]
    NotPaused,
    #[error("Cannot pause during an active hand")]
    CannotPauseDuringHand,
    #[error("Game is paused")]
    GamePaused,
    #[error("Game is over")]
    GameOver,
}

/// Construction-time settings for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub code: String,
    pub starting_chips: u32,
    pub allow_rebuys: bool,
    /// 0 = unlimited.
    pub max_rebuys: u32,
    /// Minutes after game start when rebuys close; 0 = no cutoff.
    pub rebuy_cutoff_minutes: u32,
    /// Seconds per turn before the timer auto-acts; 0 = no timer.
    pub turn_timeout: u32,
    /// Seconds between hand end and the automatic next deal; 0 = manual.
    pub auto_deal_delay: u32,
    /// Minutes per blind level; 0 = fixed blinds.
    pub blind_level_duration: u32,
    /// Target game length in hours; 0 = fixed blinds.
    pub target_game_time: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            code: String::new(),
            starting_chips: 5000,
            allow_rebuys: true,
            max_rebuys: 1,
            rebuy_cutoff_minutes: 60,
            turn_timeout: 0,
            auto_deal_delay: 10,
            blind_level_duration: 20,
            target_game_time: 4,
        }
    }
}
