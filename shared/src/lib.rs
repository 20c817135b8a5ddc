//! Homegame - Shared Types
//!
//! Cards, deck, and hand evaluation for No-Limit Texas Hold'em.
//! Pure data and algorithms - nothing in this crate touches a clock,
//! a socket, or a store.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub mod evaluator;

pub use evaluator::{determine_winners, evaluate, HandCategory, HandRank};

// ============================================================================
// CARD REPRESENTATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    /// One-letter code used in the persisted form and in log strings.
    pub fn code(&self) -> char {
        match self {
            Suit::Hearts => 'h',
            Suit::Diamonds => 'd',
            Suit::Clubs => 'c',
            Suit::Spades => 's',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'h' => Some(Suit::Hearts),
            'd' => Some(Suit::Diamonds),
            'c' => Some(Suit::Clubs),
            's' => Some(Suit::Spades),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Rank {
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
    Nine = 9,
    Ten = 10,
    Jack = 11,
    Queen = 12,
    King = 13,
    Ace = 14,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Numeric value, 2..=14 with ace high.
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(v: u8) -> Option<Self> {
        match v {
            2 => Some(Rank::Two),
            3 => Some(Rank::Three),
            4 => Some(Rank::Four),
            5 => Some(Rank::Five),
            6 => Some(Rank::Six),
            7 => Some(Rank::Seven),
            8 => Some(Rank::Eight),
            9 => Some(Rank::Nine),
            10 => Some(Rank::Ten),
            11 => Some(Rank::Jack),
            12 => Some(Rank::Queen),
            13 => Some(Rank::King),
            14 => Some(Rank::Ace),
            _ => None,
        }
    }

    /// One-character symbol ('2'..'9', 'T', 'J', 'Q', 'K', 'A').
    pub fn symbol(&self) -> char {
        match self {
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
            other => (b'0' + other.value()) as char,
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'T' => Some(Rank::Ten),
            'J' => Some(Rank::Jack),
            'Q' => Some(Rank::Queen),
            'K' => Some(Rank::King),
            'A' => Some(Rank::Ace),
            d @ '2'..='9' => Rank::from_value(d as u8 - b'0'),
            _ => None,
        }
    }
}

/// A single playing card. Equality is by (rank, suit); there are exactly
/// 52 distinct values.
///
/// Persisted as `{"rank": 2..14, "suit": "h"|"d"|"c"|"s"}`; the `Display`
/// form is the two-character string used in logs (`Ah`, `Ts`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CardRepr", into = "CardRepr")]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Parse the two-character form: "Ah", "Ts", "2c".
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let rank = Rank::from_symbol(chars.next()?)?;
        let suit = Suit::from_code(chars.next()?.to_ascii_lowercase())?;
        if chars.next().is_some() {
            return None;
        }
        Some(Card { rank, suit })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.symbol(), self.suit.code())
    }
}

/// Wire form of a card: `{"rank": int, "suit": char}`.
#[derive(Serialize, Deserialize)]
struct CardRepr {
    rank: u8,
    suit: char,
}

impl From<Card> for CardRepr {
    fn from(card: Card) -> Self {
        CardRepr {
            rank: card.rank.value(),
            suit: card.suit.code(),
        }
    }
}

impl TryFrom<CardRepr> for Card {
    type Error = String;

    fn try_from(repr: CardRepr) -> Result<Self, Self::Error> {
        let rank =
            Rank::from_value(repr.rank).ok_or_else(|| format!("invalid rank: {}", repr.rank))?;
        let suit =
            Suit::from_code(repr.suit).ok_or_else(|| format!("invalid suit: {}", repr.suit))?;
        Ok(Card { rank, suit })
    }
}

// ============================================================================
// DECK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeckError {
    #[error("Not enough cards in deck (wanted {wanted}, have {remaining})")]
    NotEnoughCards { wanted: usize, remaining: usize },
}

/// Standard 52-card deck. The top of the deck is index 0 and deals pop
/// from the front. Serialization preserves the remaining order exactly;
/// restoring a deck never reshuffles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// All 52 cards in a stable order (suit major, rank minor), unshuffled.
    pub fn ordered() -> Self {
        let mut cards = Vec::with_capacity(52);
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                cards.push(Card::new(rank, suit));
            }
        }
        Deck { cards }
    }

    /// A freshly shuffled deck. The RNG is injected so tests can seed it.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::ordered();
        deck.cards.shuffle(rng);
        deck
    }

    /// Rebuild a deck from an explicit card order (restoring a serialized
    /// deck, or stacking one for a test). The order is taken as-is.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Deck { cards }
    }

    /// Remove and return the top `n` cards.
    pub fn deal(&mut self, n: usize) -> Result<Vec<Card>, DeckError> {
        if n > self.cards.len() {
            return Err(DeckError::NotEnoughCards {
                wanted: n,
                remaining: self.cards.len(),
            });
        }
        Ok(self.cards.drain(..n).collect())
    }

    pub fn deal_one(&mut self) -> Result<Card, DeckError> {
        Ok(self.deal(1)?[0])
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

// ============================================================================
// STREETS & ACTIONS
// ============================================================================

/// Betting round within a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

/// A player's betting action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Raise,
    AllIn,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_fifty_two_distinct_cards() {
        let deck = Deck::ordered();
        let set: HashSet<Card> = deck.cards().iter().copied().collect();
        assert_eq!(set.len(), 52);
    }

    #[test]
    fn test_display_roundtrip() {
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                let card = Card::new(rank, suit);
                assert_eq!(Card::parse(&card.to_string()), Some(card));
            }
        }
    }

    #[test]
    fn test_card_serde_shape() {
        let card = Card::parse("Ah").unwrap();
        let json = serde_json::to_value(card).unwrap();
        assert_eq!(json, serde_json::json!({"rank": 14, "suit": "h"}));
        let back: Card = serde_json::from_value(json).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn test_card_serde_rejects_garbage() {
        assert!(serde_json::from_str::<Card>(r#"{"rank": 1, "suit": "h"}"#).is_err());
        assert!(serde_json::from_str::<Card>(r#"{"rank": 7, "suit": "x"}"#).is_err());
    }

    #[test]
    fn test_deal_pops_from_front() {
        let mut deck = Deck::ordered();
        let first = deck.cards()[0];
        let dealt = deck.deal(1).unwrap();
        assert_eq!(dealt[0], first);
        assert_eq!(deck.remaining(), 51);
    }

    #[test]
    fn test_deal_too_many_fails() {
        let mut deck = Deck::ordered();
        deck.deal(50).unwrap();
        let err = deck.deal(3).unwrap_err();
        assert_eq!(
            err,
            DeckError::NotEnoughCards {
                wanted: 3,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_shuffle_is_seed_deterministic() {
        let a = Deck::shuffled(&mut ChaCha8Rng::seed_from_u64(7));
        let b = Deck::shuffled(&mut ChaCha8Rng::seed_from_u64(7));
        let c = Deck::shuffled(&mut ChaCha8Rng::seed_from_u64(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deck_serde_preserves_order() {
        let mut deck = Deck::shuffled(&mut ChaCha8Rng::seed_from_u64(42));
        deck.deal(5).unwrap();
        let json = serde_json::to_string(&deck).unwrap();
        let restored: Deck = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, deck);
        assert_eq!(restored.remaining(), 47);
    }
}
