//! Per-seat state and per-hand records.

use std::collections::BTreeMap;

use homegame_shared::{Card, PlayerAction, Street};
use serde::{Deserialize, Serialize};

// ============================================================================
// PLAYER STATE
// ============================================================================

/// One seat at the table. Created at table construction and kept for the
/// lifetime of the game; per-hand fields are reset by
/// [`PlayerState::reset_for_new_hand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerState {
    pub player_id: String,
    pub name: String,
    pub chips: u32,
    pub hole_cards: Vec<Card>,
    pub bet_this_round: u32,
    pub bet_this_hand: u32,
    pub folded: bool,
    pub all_in: bool,
    pub has_acted: bool,
    pub is_sitting_out: bool,
    /// Human-readable label of the last action, for the UI ("Call 40").
    pub last_action: String,
    #[serde(default)]
    pub rebuy_count: u32,
    #[serde(default)]
    pub rebuy_queued: bool,
}

impl PlayerState {
    pub fn new(player_id: impl Into<String>, name: impl Into<String>, chips: u32) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            chips,
            hole_cards: Vec::new(),
            bet_this_round: 0,
            bet_this_hand: 0,
            folded: false,
            all_in: false,
            has_acted: false,
            is_sitting_out: false,
            last_action: String::new(),
            rebuy_count: 0,
            rebuy_queued: false,
        }
    }

    /// Still in the hand and able to act.
    pub fn is_active(&self) -> bool {
        !self.folded && !self.all_in && self.chips > 0
    }

    pub fn reset_for_new_hand(&mut self) {
        self.hole_cards.clear();
        self.bet_this_round = 0;
        self.bet_this_hand = 0;
        self.folded = false;
        self.all_in = false;
        self.has_acted = false;
        self.last_action.clear();
        self.rebuy_queued = false;
    }

    pub fn reset_for_new_round(&mut self) {
        self.bet_this_round = 0;
        self.has_acted = false;
        // Keep last_action visible for folded/all-in players.
        if !self.folded && !self.all_in {
            self.last_action.clear();
        }
    }
}

// ============================================================================
// HAND HISTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub player_id: String,
    pub action: PlayerAction,
    pub amount: u32,
    pub street: Street,
}

/// Append-only record of a single hand. Never mutated once the hand
/// completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandHistory {
    pub hand_number: u32,
    pub actions: Vec<ActionRecord>,
    pub community_cards: Vec<Vec<Card>>,
    pub winners: Vec<WinnerRecord>,
}

impl HandHistory {
    pub fn new(hand_number: u32) -> Self {
        Self {
            hand_number,
            actions: Vec::new(),
            community_cards: Vec::new(),
            winners: Vec::new(),
        }
    }

    pub fn record_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
        amount: u32,
        street: Street,
    ) {
        self.actions.push(ActionRecord {
            player_id: player_id.to_string(),
            action,
            amount,
            street,
        });
    }

    pub fn record_community(&mut self, cards: &[Card]) {
        self.community_cards.push(cards.to_vec());
    }
}

// ============================================================================
// HAND RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub player_id: String,
    pub name: String,
    pub winnings: u32,
    /// Display name of the winning hand ("Full House"), or a note for
    /// fold-out wins.
    pub hand: String,
}

/// An uncalled bet returned to its owner. Distinct from a win: only one
/// seat was eligible for this slice of the pot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub player_id: String,
    pub name: String,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerHandRecord {
    pub cards: Vec<Card>,
    pub hand_name: Option<String>,
}

/// Outcome of the last completed hand, kept for UI display until the next
/// hand starts. Card visibility inside `player_hands` is the view
/// projector's concern, not the engine's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandResult {
    pub winners: Vec<WinnerRecord>,
    #[serde(default)]
    pub refunds: Vec<RefundRecord>,
    pub pot: u32,
    pub community_cards: Vec<Card>,
    pub player_hands: BTreeMap<String, PlayerHandRecord>,
}

// ============================================================================
// ELIMINATION & STANDINGS
// ============================================================================

/// A seat that is currently out of the game. Removed again if the player
/// rebuys; the permanent record is [`Standing`], built once at game over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    pub player_id: String,
    pub hand_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub place: u32,
    pub player_id: String,
    pub name: String,
}

// ============================================================================
// VALID ACTIONS
// ============================================================================

/// An action the player on turn may legally take, with its amount bounds.
/// Serialized in the same tagged shape the UI consumes:
/// `{"action": "raise", "min_amount": 40, "max_amount": 980}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ValidAction {
    Fold,
    Check,
    Call { amount: u32 },
    Raise { min_amount: u32, max_amount: u32 },
    AllIn { amount: u32 },
}
