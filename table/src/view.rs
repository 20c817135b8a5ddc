//! Per-recipient view projection.
//!
//! The engine state is authoritative and contains every hole card; views
//! are the filtered projections actually sent to clients. A recipient only
//! ever sees their own cards (as `my_cards`), plus opponents' cards at an
//! effective showdown or after a voluntary reveal.

use std::collections::BTreeMap;

use homegame_shared::{Card, Street};
use serde::{Deserialize, Serialize};

use crate::engine::TableEngine;
use crate::state::{HandResult, PlayerHandRecord, Standing, ValidAction};

/// Recipient id used for spectator views: no own cards, no valid actions,
/// no hole cards beyond voluntary reveals.
pub const SPECTATOR_ID: &str = "__spectator__";

// ============================================================================
// VIEW SHAPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatView {
    pub player_id: String,
    pub name: String,
    pub chips: u32,
    pub bet_this_round: u32,
    pub bet_this_hand: u32,
    pub folded: bool,
    pub all_in: bool,
    pub is_sitting_out: bool,
    pub last_action: String,
    pub rebuy_count: u32,
    pub rebuy_queued: bool,
    pub can_rebuy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<Vec<Card>>,
}

/// The full per-recipient table state broadcast after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableView {
    pub code: String,
    pub hand_number: u32,
    pub street: Street,
    pub pot: u32,
    pub community_cards: Vec<Card>,
    pub dealer_idx: usize,
    pub dealer_player_id: String,
    pub action_on: Option<String>,
    pub current_bet: u32,
    pub min_raise: u32,
    pub hand_active: bool,
    pub game_over: bool,
    pub message: String,
    pub showdown: bool,
    pub players: Vec<SeatView>,
    pub last_hand_result: Option<HandResult>,
    pub shown_cards: Vec<String>,
    pub turn_timeout: u32,
    pub action_deadline: Option<f64>,
    pub auto_deal_deadline: Option<f64>,
    pub game_started_at: Option<f64>,
    pub small_blind: u32,
    pub big_blind: u32,
    pub blind_level: usize,
    pub blind_level_duration: u32,
    pub blind_schedule: Vec<(u32, u32)>,
    pub next_blind_change_at: Option<f64>,
    pub allow_rebuys: bool,
    pub max_rebuys: u32,
    pub rebuy_cutoff_minutes: u32,
    pub paused: bool,
    pub total_paused_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_standings: Option<Vec<Standing>>,
    /// The recipient's own hole cards; absent for spectators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_cards: Option<Vec<Card>>,
    /// Actions legal for the recipient; absent for spectators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_actions: Option<Vec<ValidAction>>,
}

// ============================================================================
// PROJECTION
// ============================================================================

/// Build the state view for one recipient (a player id or [`SPECTATOR_ID`]).
pub fn player_view(engine: &TableEngine, recipient: &str, now: f64) -> TableView {
    let is_spectator = recipient == SPECTATOR_ID;
    let showdown = engine.street == Street::Showdown;

    let action_on = if engine.hand_active {
        let p = &engine.seats[engine.action_on_idx];
        if p.is_active() {
            Some(p.player_id.clone())
        } else {
            None
        }
    } else {
        None
    };

    let players = engine
        .seats
        .iter()
        .map(|p| {
            // Own cards travel in my_cards only; others' cards are visible
            // at showdown (non-folded) or after a voluntary reveal.
            let reveal = p.player_id != recipient
                && !p.hole_cards.is_empty()
                && ((showdown && !p.folded) || engine.shown_cards.contains(&p.player_id));
            SeatView {
                player_id: p.player_id.clone(),
                name: p.name.clone(),
                chips: p.chips,
                bet_this_round: p.bet_this_round,
                bet_this_hand: p.bet_this_hand,
                folded: p.folded,
                all_in: p.all_in,
                is_sitting_out: p.is_sitting_out,
                last_action: p.last_action.clone(),
                rebuy_count: p.rebuy_count,
                rebuy_queued: p.rebuy_queued,
                can_rebuy: engine.can_rebuy(p, now),
                hole_cards: reveal.then(|| p.hole_cards.clone()),
            }
        })
        .collect();

    let last_hand_result = engine
        .last_hand_result
        .as_ref()
        .map(|result| filter_hand_result(result, recipient, &engine.shown_cards));

    let message = if engine.game_over {
        engine.game_over_message.clone()
    } else {
        String::new()
    };

    let my_cards = if is_spectator {
        None
    } else {
        Some(
            engine
                .find_player(recipient)
                .map(|p| p.hole_cards.clone())
                .unwrap_or_default(),
        )
    };

    let valid_actions = if is_spectator {
        None
    } else {
        Some(engine.valid_actions(recipient))
    };

    TableView {
        code: engine.code.clone(),
        hand_number: engine.hand_number,
        street: engine.street,
        pot: engine.pot,
        community_cards: engine.community_cards.clone(),
        dealer_idx: engine.dealer_idx,
        dealer_player_id: engine.seats[engine.dealer_idx].player_id.clone(),
        action_on,
        current_bet: engine.current_bet,
        min_raise: engine.min_raise,
        hand_active: engine.hand_active,
        game_over: engine.game_over,
        message,
        showdown,
        players,
        last_hand_result,
        shown_cards: engine.shown_cards.iter().cloned().collect(),
        turn_timeout: engine.turn_timeout,
        action_deadline: engine.action_deadline,
        auto_deal_deadline: engine.auto_deal_deadline,
        game_started_at: engine.game_started_at,
        small_blind: engine.small_blind,
        big_blind: engine.big_blind,
        blind_level: engine.blind_level,
        blind_level_duration: engine.blind_level_duration,
        blind_schedule: engine.blind_schedule.clone(),
        next_blind_change_at: engine.next_blind_change_at(),
        allow_rebuys: engine.allow_rebuys,
        max_rebuys: engine.max_rebuys,
        rebuy_cutoff_minutes: engine.rebuy_cutoff_minutes,
        paused: engine.paused,
        total_paused_seconds: engine.total_paused_seconds,
        final_standings: engine.game_over.then(|| engine.final_standings.clone()),
        my_cards,
        valid_actions,
    }
}

/// Hand names stay visible for everyone; cards only for the recipient's own
/// entry and for players who showed.
fn filter_hand_result(
    result: &HandResult,
    recipient: &str,
    shown: &std::collections::BTreeSet<String>,
) -> HandResult {
    let player_hands: BTreeMap<String, PlayerHandRecord> = result
        .player_hands
        .iter()
        .map(|(pid, record)| {
            if pid.as_str() == recipient || shown.contains(pid) {
                (pid.clone(), record.clone())
            } else {
                (
                    pid.clone(),
                    PlayerHandRecord {
                        cards: Vec::new(),
                        hand_name: record.hand_name.clone(),
                    },
                )
            }
        })
        .collect();

    HandResult {
        winners: result.winners.clone(),
        refunds: result.refunds.clone(),
        pot: result.pot,
        community_cards: result.community_cards.clone(),
        player_hands,
    }
}
