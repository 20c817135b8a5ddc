//! Core table engine for No-Limit Texas Hold'em.
//!
//! The authoritative state machine for a single table: dealing, betting
//! rounds, pot management, side pots, showdown, dealer rotation, blind
//! scheduling, rebuys, pause accounting, and elimination. Every operation
//! is a pure function of engine state plus the caller-supplied clock and
//! RNG; nothing here performs I/O.

use std::collections::{BTreeMap, BTreeSet};

use homegame_shared::{determine_winners, evaluate, Card, Deck, HandRank, PlayerAction, Street};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::blinds;
use crate::state::{
    Elimination, HandHistory, HandResult, PlayerHandRecord, PlayerState, RefundRecord, Standing,
    ValidAction, WinnerRecord,
};
use crate::{EngineError, TableConfig};

/// Hands kept in the on-engine history ring before the oldest is dropped.
const MAX_HAND_HISTORIES: usize = 100;

// ============================================================================
// ENGINE STATE
// ============================================================================

/// The full persisted state of one table.
///
/// Serialized as a single JSON blob. Fields added after the first release
/// carry `#[serde(default)]` so old blobs keep loading; unknown fields are
/// rejected loudly rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableEngine {
    pub code: String,
    pub small_blind: u32,
    pub big_blind: u32,
    pub starting_chips: u32,
    pub allow_rebuys: bool,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_rebuys: u32,
    /// Minutes after game start when rebuys close; 0 = no cutoff.
    #[serde(default)]
    pub rebuy_cutoff_minutes: u32,
    /// Seconds a player has to act; 0 = no turn timer.
    #[serde(default)]
    pub turn_timeout: u32,
    /// Seconds between hand end and the automatic next deal; 0 = manual.
    #[serde(default = "default_auto_deal_delay")]
    pub auto_deal_delay: u32,

    pub seats: Vec<PlayerState>,
    pub dealer_idx: usize,
    pub hand_number: u32,

    pub deck: Option<Deck>,
    pub community_cards: Vec<Card>,
    pub street: Street,
    pub pot: u32,
    pub current_bet: u32,
    pub min_raise: u32,
    pub hand_active: bool,
    pub action_on_idx: usize,
    pub last_raiser_idx: Option<usize>,

    /// Unix timestamp when the current turn expires.
    pub action_deadline: Option<f64>,
    /// Unix timestamp when the next hand deals automatically.
    pub auto_deal_deadline: Option<f64>,
    /// Unix timestamp of the first deal.
    pub game_started_at: Option<f64>,

    /// `[(small_blind, big_blind)]` per level; empty for fixed blinds.
    #[serde(default)]
    pub blind_schedule: Vec<(u32, u32)>,
    #[serde(default)]
    pub blind_level: usize,
    /// Minutes per blind level; 0 disables scheduling.
    #[serde(default)]
    pub blind_level_duration: u32,
    /// Target game length in hours the schedule was built for.
    #[serde(default)]
    pub target_game_time: u32,

    #[serde(default)]
    pub hand_histories: Vec<HandHistory>,
    #[serde(default)]
    pub current_history: Option<HandHistory>,
    #[serde(default)]
    pub last_hand_result: Option<HandResult>,

    /// Players who voluntarily revealed their cards after the hand.
    #[serde(default)]
    pub shown_cards: BTreeSet<String>,

    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub paused_at: Option<f64>,
    #[serde(default)]
    pub total_paused_seconds: f64,

    #[serde(default)]
    pub game_over: bool,
    #[serde(default)]
    pub game_over_message: String,

    /// Seats currently out of the game, oldest first. A rebuy removes the
    /// entry again; the permanent record is `final_standings`.
    #[serde(default)]
    pub elimination_order: Vec<Elimination>,
    #[serde(default)]
    pub final_standings: Vec<Standing>,
}

fn default_auto_deal_delay() -> u32 {
    10
}

impl TableEngine {
    /// Seat the given `(player_id, name)` pairs and set up the table.
    /// The first hand is dealt separately via [`TableEngine::start_new_hand`].
    pub fn new(config: TableConfig, players: &[(String, String)]) -> Self {
        let schedule =
            blinds::build_schedule(config.starting_chips, config.blind_level_duration, config.target_game_time);
        let (small_blind, big_blind) = schedule[0];
        let blind_schedule = if config.target_game_time > 0 && config.blind_level_duration > 0 {
            schedule
        } else {
            Vec::new()
        };

        let seats = players
            .iter()
            .map(|(id, name)| PlayerState::new(id.clone(), name.clone(), config.starting_chips))
            .collect();

        Self {
            code: config.code,
            small_blind,
            big_blind,
            starting_chips: config.starting_chips,
            allow_rebuys: config.allow_rebuys,
            max_rebuys: config.max_rebuys,
            rebuy_cutoff_minutes: config.rebuy_cutoff_minutes,
            turn_timeout: config.turn_timeout,
            auto_deal_delay: config.auto_deal_delay,
            seats,
            dealer_idx: 0,
            hand_number: 0,
            deck: None,
            community_cards: Vec::new(),
            street: Street::Preflop,
            pot: 0,
            current_bet: 0,
            min_raise: big_blind,
            hand_active: false,
            action_on_idx: 0,
            last_raiser_idx: None,
            action_deadline: None,
            auto_deal_deadline: None,
            game_started_at: None,
            blind_schedule,
            blind_level: 0,
            blind_level_duration: config.blind_level_duration,
            target_game_time: config.target_game_time,
            hand_histories: Vec::new(),
            current_history: None,
            last_hand_result: None,
            shown_cards: BTreeSet::new(),
            paused: false,
            paused_at: None,
            total_paused_seconds: 0.0,
            game_over: false,
            game_over_message: String::new(),
            elimination_order: Vec::new(),
            final_standings: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn find_idx(&self, player_id: &str) -> Option<usize> {
        self.seats.iter().position(|p| p.player_id == player_id)
    }

    pub fn find_player(&self, player_id: &str) -> Option<&PlayerState> {
        self.find_idx(player_id).map(|i| &self.seats[i])
    }

    /// Seats taking part in the game (not sitting out).
    pub fn live_seats(&self) -> Vec<usize> {
        self.seats
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_sitting_out)
            .map(|(i, _)| i)
            .collect()
    }

    /// Non-folded seats still contesting the current hand.
    fn players_in_hand(&self) -> Vec<usize> {
        self.seats
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.folded && !p.is_sitting_out)
            .map(|(i, _)| i)
            .collect()
    }

    /// Seats that can still take actions this hand.
    fn players_who_can_act(&self) -> Vec<usize> {
        self.seats
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active() && !p.is_sitting_out)
            .map(|(i, _)| i)
            .collect()
    }

    /// Next occupied seat after `idx`, wrapping around and skipping seats
    /// that sit out (and, with `only_active`, seats that cannot act).
    fn next_seat(&self, idx: usize, only_active: bool) -> usize {
        let n = self.seats.len();
        for offset in 1..=n {
            let i = (idx + offset) % n;
            let p = &self.seats[i];
            if p.is_sitting_out {
                continue;
            }
            if only_active && (!p.is_active() || p.folded) {
                continue;
            }
            return i;
        }
        idx
    }

    fn set_action_deadline(&mut self, now: f64) {
        self.action_deadline = if self.turn_timeout > 0 && self.hand_active {
            Some(now + self.turn_timeout as f64)
        } else {
            None
        };
    }

    fn set_auto_deal_deadline(&mut self, now: f64) {
        self.auto_deal_deadline =
            if self.auto_deal_delay > 0 && !self.hand_active && !self.paused && !self.game_over {
                Some(now + self.auto_deal_delay as f64)
            } else {
                None
            };
    }

    /// Elapsed game seconds, excluding time spent paused.
    pub fn effective_elapsed(&self, now: f64) -> f64 {
        let started = match self.game_started_at {
            Some(t) => t,
            None => return 0.0,
        };
        let reference = match (self.paused, self.paused_at) {
            (true, Some(t)) => t,
            _ => now,
        };
        (reference - started) - self.total_paused_seconds
    }

    fn maybe_advance_blind_level(&mut self, now: f64) {
        if self.blind_level_duration == 0
            || self.blind_schedule.is_empty()
            || self.game_started_at.is_none()
        {
            return;
        }

        let elapsed_minutes = self.effective_elapsed(now) / 60.0;
        let target_level = (elapsed_minutes / self.blind_level_duration as f64).floor() as usize;

        // Play outlived the schedule: keep ramping 1.5x per level.
        while target_level >= self.blind_schedule.len() {
            blinds::extend_schedule(&mut self.blind_schedule);
        }

        if target_level > self.blind_level {
            self.blind_level = target_level;
            let (sb, bb) = self.blind_schedule[self.blind_level];
            self.small_blind = sb;
            self.big_blind = bb;
        }
    }

    /// Unix timestamp when the next blind level starts, or None when fixed,
    /// paused, or already at the top of the schedule.
    pub fn next_blind_change_at(&self) -> Option<f64> {
        if self.blind_level_duration == 0
            || self.blind_schedule.is_empty()
            || self.paused
        {
            return None;
        }
        let started = self.game_started_at?;
        if self.blind_level + 1 >= self.blind_schedule.len() {
            return None;
        }
        let next_level = (self.blind_level + 1) as f64;
        Some(started + self.total_paused_seconds + next_level * self.blind_level_duration as f64 * 60.0)
    }

    // ------------------------------------------------------------------
    // Hand lifecycle
    // ------------------------------------------------------------------

    /// Deal a new hand: process queued rebuys, record eliminations, rotate
    /// the dealer, shuffle, deal hole cards, and post blinds.
    pub fn start_new_hand<R: Rng + ?Sized>(
        &mut self,
        now: f64,
        rng: &mut R,
    ) -> Result<(), EngineError> {
        if self.game_over {
            return Ok(());
        }

        // Queued rebuys buy back in before anything else.
        for i in 0..self.seats.len() {
            if self.seats[i].rebuy_queued {
                let starting = self.starting_chips;
                let p = &mut self.seats[i];
                p.chips = starting;
                p.is_sitting_out = false;
                p.rebuy_count += 1;
                p.rebuy_queued = false;
                let pid = p.player_id.clone();
                self.elimination_order.retain(|e| e.player_id != pid);
            }
        }

        self.record_eliminations();

        if self.live_seats().len() < 2 {
            self.finish_game();
            return Ok(());
        }

        self.hand_number += 1;
        if self.hand_number == 1 {
            self.game_started_at = Some(now);
        }

        self.maybe_advance_blind_level(now);

        self.auto_deal_deadline = None;
        self.shown_cards.clear();
        self.last_hand_result = None;

        if self.hand_number > 1 {
            self.dealer_idx = self.next_seat(self.dealer_idx, false);
        }

        for p in &mut self.seats {
            if !p.is_sitting_out {
                p.reset_for_new_hand();
            } else {
                // Sitting-out seats keep no stale per-hand state either.
                p.hole_cards.clear();
                p.bet_this_round = 0;
                p.bet_this_hand = 0;
                p.folded = false;
                p.all_in = false;
                p.has_acted = false;
            }
        }

        let mut deck = Deck::shuffled(rng);
        for p in &mut self.seats {
            if !p.is_sitting_out {
                p.hole_cards = deck
                    .deal(2)
                    .expect("a 52-card deck covers every seated player");
            }
        }
        self.deck = Some(deck);

        self.community_cards.clear();
        self.street = Street::Preflop;
        self.pot = 0;
        self.current_bet = 0;
        self.min_raise = self.big_blind;
        self.last_raiser_idx = None;

        self.current_history = Some(HandHistory::new(self.hand_number));
        self.hand_active = true;

        self.post_blinds(now);
        Ok(())
    }

    fn post_blinds(&mut self, now: f64) {
        let live = self.live_seats();

        let (sb_idx, bb_idx) = if live.len() == 2 {
            // Heads-up: the dealer posts the small blind.
            (self.dealer_idx, self.next_seat(self.dealer_idx, false))
        } else {
            let sb = self.next_seat(self.dealer_idx, false);
            (sb, self.next_seat(sb, false))
        };

        let (sb_amount, bb_amount) = (self.small_blind, self.big_blind);
        self.force_bet(sb_idx, sb_amount, "SB");
        self.force_bet(bb_idx, bb_amount, "BB");

        self.current_bet = self.big_blind;
        self.min_raise = self.big_blind;

        // Action starts after the big blind, who acts last preflop.
        self.action_on_idx = self.next_seat(bb_idx, false);
        self.last_raiser_idx = Some(bb_idx);
        self.set_action_deadline(now);
    }

    /// Force a blind bet; short stacks post what they have and go all-in.
    fn force_bet(&mut self, idx: usize, amount: u32, label: &str) -> u32 {
        let p = &mut self.seats[idx];
        let actual = amount.min(p.chips);
        p.chips -= actual;
        p.bet_this_round += actual;
        p.bet_this_hand += actual;
        self.pot += actual;
        p.last_action = format!("{label} {actual}");
        if p.chips == 0 {
            p.all_in = true;
        }
        actual
    }

    // ------------------------------------------------------------------
    // Action processing
    // ------------------------------------------------------------------

    /// Legal actions for `player_id` right now. Empty unless the player is
    /// seated, on turn, and able to act.
    pub fn valid_actions(&self, player_id: &str) -> Vec<ValidAction> {
        let idx = match self.find_idx(player_id) {
            Some(i) => i,
            None => return Vec::new(),
        };
        if idx != self.action_on_idx || !self.hand_active {
            return Vec::new();
        }
        let p = &self.seats[idx];
        if !p.is_active() {
            return Vec::new();
        }

        let mut actions = vec![ValidAction::Fold];
        let to_call = self.current_bet - p.bet_this_round;

        if to_call == 0 {
            actions.push(ValidAction::Check);
        } else {
            actions.push(ValidAction::Call {
                amount: to_call.min(p.chips),
            });
        }

        let min_raise_to = self.current_bet + self.min_raise;
        let max_raise_to = p.bet_this_round + p.chips;

        if max_raise_to > self.current_bet {
            if p.chips <= to_call {
                // All-in for a call or less: already covered by call.
            } else if max_raise_to < min_raise_to {
                // Cannot meet the minimum raise: only the all-in is offered.
                actions.push(ValidAction::AllIn { amount: p.chips });
            } else {
                actions.push(ValidAction::Raise {
                    min_amount: min_raise_to - p.bet_this_round,
                    max_amount: p.chips,
                });
            }
        }

        actions
    }

    /// Apply one player action. `amount` is the additional contribution this
    /// round and only meaningful for raises.
    pub fn process_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
        amount: u32,
        now: f64,
    ) -> Result<(), EngineError> {
        let idx = self.find_idx(player_id).ok_or(EngineError::PlayerNotFound)?;
        if !self.hand_active {
            return Err(EngineError::NoActiveHand);
        }
        if idx != self.action_on_idx {
            return Err(EngineError::NotYourTurn);
        }
        if !self.seats[idx].is_active() {
            return Err(EngineError::PlayerCannotAct);
        }

        let to_call = self.current_bet - self.seats[idx].bet_this_round;

        match action {
            PlayerAction::Fold => self.do_fold(idx),
            PlayerAction::Check => {
                if to_call > 0 {
                    return Err(EngineError::CannotCheck);
                }
                self.do_check(idx);
            }
            PlayerAction::Call => self.do_call(idx),
            PlayerAction::Raise => self.do_raise(idx, amount)?,
            PlayerAction::AllIn => self.do_all_in(idx),
        }

        // Hand over: everyone else folded.
        let in_hand = self.players_in_hand();
        if in_hand.len() == 1 {
            return self.award_pot_to_last_player(in_hand[0], now);
        }

        if self.is_round_complete() {
            return self.advance_street(now);
        }

        self.action_on_idx = self.next_seat(idx, true);
        self.set_action_deadline(now);
        Ok(())
    }

    fn record(&mut self, idx: usize, action: PlayerAction, amount: u32) {
        let pid = self.seats[idx].player_id.clone();
        let street = self.street;
        if let Some(h) = &mut self.current_history {
            h.record_action(&pid, action, amount, street);
        }
    }

    fn do_fold(&mut self, idx: usize) {
        let p = &mut self.seats[idx];
        p.folded = true;
        p.has_acted = true;
        p.last_action = "Fold".to_string();
        self.record(idx, PlayerAction::Fold, 0);
    }

    fn do_check(&mut self, idx: usize) {
        let p = &mut self.seats[idx];
        p.has_acted = true;
        p.last_action = "Check".to_string();
        self.record(idx, PlayerAction::Check, 0);
    }

    fn do_call(&mut self, idx: usize) {
        let current_bet = self.current_bet;
        let p = &mut self.seats[idx];
        let to_call = current_bet - p.bet_this_round;
        let actual = to_call.min(p.chips);
        p.chips -= actual;
        p.bet_this_round += actual;
        p.bet_this_hand += actual;
        self.pot += actual;
        p.has_acted = true;
        p.last_action = format!("Call {actual}");
        if p.chips == 0 {
            p.all_in = true;
            p.last_action = format!("All-In {actual}");
        }
        self.record(idx, PlayerAction::Call, actual);
    }

    fn do_raise(&mut self, idx: usize, amount: u32) -> Result<(), EngineError> {
        let min_raise_to = self.current_bet + self.min_raise;
        let current_bet = self.current_bet;
        let p = &mut self.seats[idx];

        // A raise below the minimum is only legal as an all-in for less.
        let required = min_raise_to.saturating_sub(p.bet_this_round);
        if amount < required && amount < p.chips {
            return Err(EngineError::MustMeetMinRaise { min: required });
        }

        let actual = amount.min(p.chips);
        let raise_size = (p.bet_this_round + actual).saturating_sub(current_bet);

        p.chips -= actual;
        p.bet_this_round += actual;
        p.bet_this_hand += actual;
        self.pot += actual;

        if raise_size > 0 {
            self.min_raise = self.min_raise.max(raise_size);
        }
        self.current_bet = self.seats[idx].bet_this_round;
        self.last_raiser_idx = Some(idx);

        let p = &mut self.seats[idx];
        p.has_acted = true;
        p.last_action = format!("Raise {actual}");
        if p.chips == 0 {
            p.all_in = true;
            p.last_action = format!("All-In {}", p.bet_this_hand);
        }

        // Everyone else gets to respond to the raise.
        for (i, other) in self.seats.iter_mut().enumerate() {
            if i != idx && other.is_active() {
                other.has_acted = false;
            }
        }

        self.record(idx, PlayerAction::Raise, actual);
        Ok(())
    }

    fn do_all_in(&mut self, idx: usize) {
        let current_bet = self.current_bet;
        let p = &mut self.seats[idx];
        let amount = p.chips;
        let new_total = p.bet_this_round + amount;

        let is_raise = new_total > current_bet;
        if is_raise {
            let raise_size = new_total - current_bet;
            if raise_size >= self.min_raise {
                self.min_raise = raise_size;
            }
            self.current_bet = new_total;
            self.last_raiser_idx = Some(idx);
        }

        let p = &mut self.seats[idx];
        p.chips = 0;
        p.bet_this_round = new_total;
        p.bet_this_hand += amount;
        self.pot += amount;
        p.all_in = true;
        p.has_acted = true;
        p.last_action = format!("All-In {}", p.bet_this_hand);

        if is_raise {
            for (i, other) in self.seats.iter_mut().enumerate() {
                if i != idx && other.is_active() {
                    other.has_acted = false;
                }
            }
        }

        self.record(idx, PlayerAction::AllIn, amount);
    }

    // ------------------------------------------------------------------
    // Round / street management
    // ------------------------------------------------------------------

    fn is_round_complete(&self) -> bool {
        let actors = self.players_who_can_act();
        if actors.is_empty() {
            return true;
        }
        for i in actors {
            let p = &self.seats[i];
            if !p.has_acted {
                return false;
            }
            if p.bet_this_round < self.current_bet && !p.all_in {
                return false;
            }
        }
        true
    }

    /// Move to the next street, running out the board when fewer than two
    /// seats can still act. River advances into showdown.
    fn advance_street(&mut self, now: f64) -> Result<(), EngineError> {
        loop {
            for p in &mut self.seats {
                p.reset_for_new_round();
            }
            self.current_bet = 0;
            self.min_raise = self.big_blind;
            self.last_raiser_idx = None;

            let can_act = self.players_who_can_act().len();

            match self.street {
                Street::Preflop => {
                    self.street = Street::Flop;
                    self.deal_community(3);
                }
                Street::Flop => {
                    self.street = Street::Turn;
                    self.deal_community(1);
                }
                Street::Turn => {
                    self.street = Street::River;
                    self.deal_community(1);
                }
                Street::River => return self.showdown(now),
                Street::Showdown => return Ok(()),
            }

            if can_act >= 2 {
                break;
            }
        }

        // First active seat after the dealer acts first; heads-up post-flop
        // the dealer acts first.
        let live = self.live_seats();
        if live.len() == 2 {
            self.action_on_idx = self.dealer_idx;
            if !self.seats[self.action_on_idx].is_active() {
                self.action_on_idx = self.next_seat(self.dealer_idx, true);
            }
        } else {
            self.action_on_idx = self.next_seat(self.dealer_idx, true);
        }

        self.set_action_deadline(now);
        Ok(())
    }

    /// Burn one card, then deal `n` community cards.
    fn deal_community(&mut self, n: usize) {
        let deck = self
            .deck
            .as_mut()
            .expect("active hand must have a deck");
        deck.deal_one().expect("deck exhausted burning a card");
        let cards = deck.deal(n).expect("deck exhausted dealing community cards");
        self.community_cards.extend(&cards);
        if let Some(h) = &mut self.current_history {
            h.record_community(&cards);
        }
    }

    // ------------------------------------------------------------------
    // Side pots & showdown
    // ------------------------------------------------------------------

    /// Build the main pot and side pots from `bet_this_hand` contributions.
    ///
    /// Returns `(amount, eligible_seat_indices)` per pot. Folded seats pay
    /// into the pots but are never eligible.
    pub fn calculate_pots(&self) -> Vec<(u32, Vec<usize>)> {
        let in_hand = self.players_in_hand();

        let mut levels: Vec<u32> = in_hand
            .iter()
            .map(|&i| self.seats[i].bet_this_hand)
            .collect();
        levels.sort_unstable();
        levels.dedup();

        // Every contribution counts toward the pool, folded seats included.
        let contributions: Vec<u32> = self
            .seats
            .iter()
            .map(|p| if p.is_sitting_out { 0 } else { p.bet_this_hand })
            .collect();

        let mut pots = Vec::new();
        let mut prev_level = 0u32;

        for level in levels {
            let slice = level - prev_level;
            if slice == 0 {
                continue;
            }

            let amount: u32 = contributions
                .iter()
                .map(|&contrib| slice.min(contrib.saturating_sub(prev_level)))
                .sum();

            let eligible: Vec<usize> = in_hand
                .iter()
                .copied()
                .filter(|&i| self.seats[i].bet_this_hand >= level)
                .collect();

            if amount > 0 && !eligible.is_empty() {
                pots.push((amount, eligible));
            }
            prev_level = level;
        }

        pots
    }

    /// Evaluate hands, split each pot among its winners, refund uncalled
    /// bets, and close out the hand.
    fn showdown(&mut self, now: f64) -> Result<(), EngineError> {
        self.street = Street::Showdown;

        let in_hand = self.players_in_hand();

        let mut player_hands: BTreeMap<String, HandRank> = BTreeMap::new();
        for &i in &in_hand {
            let p = &self.seats[i];
            let mut cards = p.hole_cards.clone();
            cards.extend(&self.community_cards);
            if cards.len() >= 5 {
                let rank = evaluate(&cards).expect("showdown hand has at least five cards");
                player_hands.insert(p.player_id.clone(), rank);
            }
        }

        let pots = self.calculate_pots();
        let mut winnings: BTreeMap<String, u32> = BTreeMap::new();
        let mut best_hand: BTreeMap<String, String> = BTreeMap::new();
        let mut refunds: Vec<RefundRecord> = Vec::new();

        for (pot_amount, eligible) in pots {
            if eligible.len() == 1 {
                // Uncalled bet: returned, not won.
                let p = &mut self.seats[eligible[0]];
                p.chips += pot_amount;
                refunds.push(RefundRecord {
                    player_id: p.player_id.clone(),
                    name: p.name.clone(),
                    amount: pot_amount,
                });
                continue;
            }

            let eligible_hands: BTreeMap<String, HandRank> = eligible
                .iter()
                .filter_map(|&i| {
                    let pid = &self.seats[i].player_id;
                    player_hands.get(pid).map(|r| (pid.clone(), r.clone()))
                })
                .collect();

            let mut winner_ids = determine_winners(&eligible_hands);
            if winner_ids.is_empty() {
                continue;
            }
            // Odd chips go one per winner in seat order.
            winner_ids.sort_by_key(|pid| self.find_idx(pid).unwrap_or(usize::MAX));

            let share = pot_amount / winner_ids.len() as u32;
            let remainder = pot_amount - share * winner_ids.len() as u32;

            for (j, pid) in winner_ids.iter().enumerate() {
                let won = share + u32::from((j as u32) < remainder);
                if let Some(i) = self.find_idx(pid) {
                    self.seats[i].chips += won;
                    *winnings.entry(pid.clone()).or_insert(0) += won;
                    if let Some(rank) = player_hands.get(pid) {
                        best_hand.insert(pid.clone(), rank.name().to_string());
                    }
                }
            }
        }

        let result_winners: Vec<WinnerRecord> = self
            .seats
            .iter()
            .filter_map(|p| {
                winnings.get(&p.player_id).map(|&won| WinnerRecord {
                    player_id: p.player_id.clone(),
                    name: p.name.clone(),
                    winnings: won,
                    hand: best_hand
                        .get(&p.player_id)
                        .cloned()
                        .unwrap_or_else(|| "Unknown".to_string()),
                })
            })
            .collect();

        let player_hand_records: BTreeMap<String, PlayerHandRecord> = in_hand
            .iter()
            .map(|&i| {
                let p = &self.seats[i];
                (
                    p.player_id.clone(),
                    PlayerHandRecord {
                        cards: p.hole_cards.clone(),
                        hand_name: player_hands.get(&p.player_id).map(|r| r.name().to_string()),
                    },
                )
            })
            .collect();

        self.last_hand_result = Some(HandResult {
            winners: result_winners.clone(),
            refunds,
            pot: self.pot,
            community_cards: self.community_cards.clone(),
            player_hands: player_hand_records,
        });

        self.close_hand(result_winners, now);
        Ok(())
    }

    /// Everyone else folded: the whole pot goes to the last seat standing,
    /// no showdown, no cards revealed.
    fn award_pot_to_last_player(&mut self, winner_idx: usize, now: f64) -> Result<(), EngineError> {
        let pot = self.pot;
        let winner = &mut self.seats[winner_idx];
        winner.chips += pot;

        let winners = vec![WinnerRecord {
            player_id: winner.player_id.clone(),
            name: winner.name.clone(),
            winnings: pot,
            hand: "Last player standing".to_string(),
        }];

        self.last_hand_result = Some(HandResult {
            winners: winners.clone(),
            refunds: Vec::new(),
            pot,
            community_cards: self.community_cards.clone(),
            player_hands: BTreeMap::new(),
        });

        self.close_hand(winners, now);
        Ok(())
    }

    /// Shared end-of-hand bookkeeping for showdown and fold-out wins.
    fn close_hand(&mut self, winners: Vec<WinnerRecord>, now: f64) {
        if let Some(mut history) = self.current_history.take() {
            history.winners = winners;
            self.hand_histories.push(history);
            if self.hand_histories.len() > MAX_HAND_HISTORIES {
                let excess = self.hand_histories.len() - MAX_HAND_HISTORIES;
                self.hand_histories.drain(..excess);
            }
        }

        self.pot = 0;
        self.hand_active = false;
        self.action_deadline = None;

        self.record_eliminations();
        if self.is_game_finished(now) {
            self.finish_game();
        } else {
            self.set_auto_deal_deadline(now);
        }
    }

    // ------------------------------------------------------------------
    // Elimination & game over
    // ------------------------------------------------------------------

    /// Sit out every busted seat without a queued rebuy and add it to the
    /// currently-out list. A later rebuy removes the entry again.
    fn record_eliminations(&mut self) {
        let hand_number = self.hand_number;
        for p in &mut self.seats {
            if p.chips == 0 && !p.rebuy_queued && !p.is_sitting_out {
                p.is_sitting_out = true;
            }
            if p.chips == 0
                && !p.rebuy_queued
                && !self
                    .elimination_order
                    .iter()
                    .any(|e| e.player_id == p.player_id)
            {
                self.elimination_order.push(Elimination {
                    player_id: p.player_id.clone(),
                    hand_number,
                });
            }
        }
    }

    fn is_game_finished(&self, now: f64) -> bool {
        if self.live_seats().len() >= 2 {
            return false;
        }
        !self
            .seats
            .iter()
            .any(|p| p.rebuy_queued || self.can_rebuy(p, now))
    }

    /// Mark the game over and build the final standings: the surviving seat
    /// first, then eliminations in reverse order.
    fn finish_game(&mut self) {
        self.game_over = true;
        self.hand_active = false;
        self.action_deadline = None;
        self.auto_deal_deadline = None;

        let winner = self
            .seats
            .iter()
            .find(|p| {
                !self
                    .elimination_order
                    .iter()
                    .any(|e| e.player_id == p.player_id)
            })
            .map(|p| (p.player_id.clone(), p.name.clone()));

        let mut standings = Vec::new();
        let mut place = 1u32;
        if let Some((pid, name)) = &winner {
            standings.push(Standing {
                place,
                player_id: pid.clone(),
                name: name.clone(),
            });
            place += 1;
        }
        for e in self.elimination_order.iter().rev() {
            if let Some(p) = self.seats.iter().find(|p| p.player_id == e.player_id) {
                standings.push(Standing {
                    place,
                    player_id: p.player_id.clone(),
                    name: p.name.clone(),
                });
                place += 1;
            }
        }
        self.final_standings = standings;

        self.game_over_message = match &winner {
            Some((_, name)) => format!("{name} wins the game!"),
            None => "Not enough players to continue".to_string(),
        };
    }

    // ------------------------------------------------------------------
    // Rebuys
    // ------------------------------------------------------------------

    /// Whether a busted seat could buy back in right now. Requires rebuys
    /// to be enabled, the rebuy limit and cutoff unspent, and that buying
    /// back would leave more than two seats in the game - busting heads-up
    /// always ends the game.
    pub fn can_rebuy(&self, p: &PlayerState, now: f64) -> bool {
        if !self.allow_rebuys || self.game_over {
            return false;
        }
        if p.chips > 0 {
            return false;
        }
        let others_live = self
            .seats
            .iter()
            .filter(|s| s.player_id != p.player_id && !s.is_sitting_out)
            .count();
        if others_live + 1 <= 2 {
            return false;
        }
        if self.max_rebuys > 0 && p.rebuy_count >= self.max_rebuys {
            return false;
        }
        if self.rebuy_cutoff_minutes > 0 {
            if let Some(started) = self.game_started_at {
                if (now - started) / 60.0 >= self.rebuy_cutoff_minutes as f64 {
                    return false;
                }
            }
        }
        true
    }

    /// Buy a busted player back to the starting stack. During an active
    /// hand the rebuy is queued and processed when the next hand starts.
    pub fn rebuy(&mut self, player_id: &str, now: f64) -> Result<(), EngineError> {
        if self.game_over {
            return Err(EngineError::GameOver);
        }
        if !self.allow_rebuys {
            return Err(EngineError::RebuysDisabled);
        }
        let idx = self.find_idx(player_id).ok_or(EngineError::PlayerNotFound)?;
        if self.seats[idx].chips > 0 {
            return Err(EngineError::NotBusted);
        }
        if self.max_rebuys > 0 && self.seats[idx].rebuy_count >= self.max_rebuys {
            return Err(EngineError::MaxRebuysReached {
                max: self.max_rebuys,
            });
        }
        if self.rebuy_cutoff_minutes > 0 {
            if let Some(started) = self.game_started_at {
                if (now - started) / 60.0 >= self.rebuy_cutoff_minutes as f64 {
                    return Err(EngineError::CutoffPassed {
                        minutes: self.rebuy_cutoff_minutes,
                    });
                }
            }
        }

        if self.hand_active {
            if self.seats[idx].rebuy_queued {
                return Err(EngineError::AlreadyQueued);
            }
            self.seats[idx].rebuy_queued = true;
            return Ok(());
        }

        let starting = self.starting_chips;
        let p = &mut self.seats[idx];
        p.chips = starting;
        p.is_sitting_out = false;
        p.rebuy_count += 1;
        let pid = p.player_id.clone();
        self.elimination_order.retain(|e| e.player_id != pid);
        Ok(())
    }

    pub fn cancel_rebuy(&mut self, player_id: &str) -> Result<(), EngineError> {
        let idx = self.find_idx(player_id).ok_or(EngineError::PlayerNotFound)?;
        if !self.seats[idx].rebuy_queued {
            return Err(EngineError::NoRebuyQueued);
        }
        self.seats[idx].rebuy_queued = false;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Card reveal & pause
    // ------------------------------------------------------------------

    /// Voluntarily reveal hole cards after the hand has ended.
    pub fn show_cards(&mut self, player_id: &str) -> Result<(), EngineError> {
        if self.hand_active {
            return Err(EngineError::HandStillActive);
        }
        let p = self
            .find_player(player_id)
            .ok_or(EngineError::PlayerNotFound)?;
        if p.hole_cards.is_empty() {
            return Err(EngineError::NoCardsToShow);
        }
        self.shown_cards.insert(player_id.to_string());
        Ok(())
    }

    /// Pause between hands. Stops the auto-deal timer and the blind clock.
    pub fn pause(&mut self, now: f64) -> Result<(), EngineError> {
        if self.paused {
            return Err(EngineError::AlreadyPaused);
        }
        if self.hand_active {
            return Err(EngineError::CannotPauseDuringHand);
        }
        self.paused = true;
        self.paused_at = Some(now);
        self.auto_deal_deadline = None;
        Ok(())
    }

    pub fn unpause(&mut self, now: f64) -> Result<(), EngineError> {
        if !self.paused {
            return Err(EngineError::NotPaused);
        }
        if let Some(paused_at) = self.paused_at {
            self.total_paused_seconds += now - paused_at;
        }
        self.paused = false;
        self.paused_at = None;
        self.set_auto_deal_deadline(now);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Sum of all chips in play (stacks plus the pot). Constant across a
    /// hand; grows only by rebuys.
    pub fn total_chips(&self) -> u32 {
        self.seats.iter().map(|p| p.chips).sum::<u32>() + self.pot
    }

    /// Assert the structural invariants that must hold after every public
    /// operation. Violations are unrecoverable corruption and panic.
    pub fn check_invariants(&self) {
        let max_bet = self
            .seats
            .iter()
            .map(|p| p.bet_this_round)
            .max()
            .unwrap_or(0);
        assert!(
            self.current_bet >= max_bet,
            "current_bet {} below table max bet {}",
            self.current_bet,
            max_bet
        );

        if self.hand_active {
            let p = &self.seats[self.action_on_idx];
            assert!(
                !p.is_sitting_out && !p.folded && !p.all_in && p.chips > 0,
                "action on a seat that cannot act: {:?}",
                p.player_id
            );
            assert!(self.min_raise >= self.big_blind, "min_raise below big blind");
        }

        let expected_community = match self.street {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River | Street::Showdown => 5,
        };
        assert_eq!(
            self.community_cards.len(),
            expected_community,
            "community card count does not match street"
        );

        let mut seen: BTreeSet<(u8, char)> = BTreeSet::new();
        let mut check_card = |c: &Card| {
            assert!(
                seen.insert((c.rank.value(), c.suit.code())),
                "duplicate card in play: {c}"
            );
        };
        if let Some(deck) = &self.deck {
            for c in deck.cards() {
                check_card(c);
            }
        }
        for c in &self.community_cards {
            check_card(c);
        }
        for p in &self.seats {
            for c in &p.hole_cards {
                check_card(c);
            }
        }

        if self.game_over {
            assert!(!self.hand_active, "game over with an active hand");
            assert!(
                self.live_seats().len() <= 1,
                "game over with more than one live seat"
            );
        }
    }
}
