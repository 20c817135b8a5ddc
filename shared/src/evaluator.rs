//! Texas Hold'em hand evaluator.
//!
//! Ranks the best 5-card hand out of 5..=7 cards. A [`HandRank`] is totally
//! ordered: compare with `<`, `>`, `==`; equality means a genuine tie.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Card, Suit};

// ============================================================================
// HAND CATEGORIES
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HandCategory {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
    RoyalFlush = 9,
}

impl HandCategory {
    pub const ALL: [HandCategory; 10] = [
        HandCategory::HighCard,
        HandCategory::OnePair,
        HandCategory::TwoPair,
        HandCategory::ThreeOfAKind,
        HandCategory::Straight,
        HandCategory::Flush,
        HandCategory::FullHouse,
        HandCategory::FourOfAKind,
        HandCategory::StraightFlush,
        HandCategory::RoyalFlush,
    ];

    /// Display name shown in hand results ("Full House", ...).
    pub fn name(&self) -> &'static str {
        match self {
            HandCategory::HighCard => "High Card",
            HandCategory::OnePair => "One Pair",
            HandCategory::TwoPair => "Two Pair",
            HandCategory::ThreeOfAKind => "Three of a Kind",
            HandCategory::Straight => "Straight",
            HandCategory::Flush => "Flush",
            HandCategory::FullHouse => "Full House",
            HandCategory::FourOfAKind => "Four of a Kind",
            HandCategory::StraightFlush => "Straight Flush",
            HandCategory::RoyalFlush => "Royal Flush",
        }
    }
}

/// Comparable hand ranking: `(category, tiebreakers)` compared
/// lexicographically. Tiebreakers are rank values ordered by significance;
/// the wheel (A-2-3-4-5) carries a 5, not an ace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandRank {
    pub category: HandCategory,
    pub tiebreakers: Vec<u8>,
}

impl HandRank {
    pub fn name(&self) -> &'static str {
        self.category.name()
    }
}

impl PartialOrd for HandRank {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HandRank {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.category.cmp(&other.category) {
            std::cmp::Ordering::Equal => self.tiebreakers.cmp(&other.tiebreakers),
            ord => ord,
        }
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("Need at least 5 cards, got {0}")]
    TooFewCards(usize),
}

/// Evaluate the best 5-card hand from `cards` (typically 2 hole cards plus
/// up to 5 community cards). Fewer than 5 cards is a caller bug and fails.
pub fn evaluate(cards: &[Card]) -> Result<HandRank, EvalError> {
    if cards.len() < 5 {
        return Err(EvalError::TooFewCards(cards.len()));
    }

    if cards.len() == 5 {
        return Ok(evaluate_five(cards));
    }

    let mut best: Option<HandRank> = None;
    for combo in combinations(cards, 5) {
        let rank = evaluate_five(&combo);
        if best.as_ref().map_or(true, |b| rank > *b) {
            best = Some(rank);
        }
    }
    // combinations() of >=5 cards choose 5 is never empty
    Ok(best.unwrap())
}

/// Given `{player_id: HandRank}`, return the ids holding the maximal rank
/// (ties possible). Empty input returns an empty vec.
pub fn determine_winners(player_hands: &BTreeMap<String, HandRank>) -> Vec<String> {
    let best = match player_hands.values().max() {
        Some(rank) => rank.clone(),
        None => return Vec::new(),
    };
    player_hands
        .iter()
        .filter(|(_, rank)| **rank == best)
        .map(|(pid, _)| pid.clone())
        .collect()
}

/// All k-element subsets of `items`, preserving element order.
fn combinations<T: Copy>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![vec![]];
    }
    if items.len() < k {
        return vec![];
    }

    let mut result = vec![];
    for i in 0..=items.len() - k {
        let head = items[i];
        for mut tail in combinations(&items[i + 1..], k - 1) {
            tail.insert(0, head);
            result.push(tail);
        }
    }
    result
}

/// Classify exactly 5 cards.
fn evaluate_five(cards: &[Card]) -> HandRank {
    debug_assert_eq!(cards.len(), 5);

    let mut ranks: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));

    let suits: Vec<Suit> = cards.iter().map(|c| c.suit).collect();
    let is_flush = suits.iter().all(|s| *s == suits[0]);

    let mut unique_ranks = ranks.clone();
    unique_ranks.dedup();

    // Straight detection, with the wheel (A-2-3-4-5) as a 5-high straight.
    let mut is_straight = false;
    let mut high_card = ranks[0];
    if unique_ranks.len() == 5 {
        if unique_ranks[0] - unique_ranks[4] == 4 {
            is_straight = true;
            high_card = unique_ranks[0];
        } else if unique_ranks == [14, 5, 4, 3, 2] {
            is_straight = true;
            high_card = 5;
        }
    }

    if is_straight && is_flush {
        if high_card == 14 && ranks[4] == 10 {
            return HandRank {
                category: HandCategory::RoyalFlush,
                tiebreakers: vec![14],
            };
        }
        return HandRank {
            category: HandCategory::StraightFlush,
            tiebreakers: vec![high_card],
        };
    }

    // Group by multiplicity: (count desc, rank desc).
    let mut counts: BTreeMap<u8, u8> = BTreeMap::new();
    for r in &ranks {
        *counts.entry(*r).or_insert(0) += 1;
    }
    let mut groups: Vec<(u8, u8)> = counts.into_iter().collect();
    groups.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

    if groups[0].1 == 4 {
        return HandRank {
            category: HandCategory::FourOfAKind,
            tiebreakers: vec![groups[0].0, groups[1].0],
        };
    }

    if groups[0].1 == 3 && groups[1].1 == 2 {
        return HandRank {
            category: HandCategory::FullHouse,
            tiebreakers: vec![groups[0].0, groups[1].0],
        };
    }

    if is_flush {
        return HandRank {
            category: HandCategory::Flush,
            tiebreakers: ranks,
        };
    }

    if is_straight {
        return HandRank {
            category: HandCategory::Straight,
            tiebreakers: vec![high_card],
        };
    }

    let kickers = |groups: &[(u8, u8)]| -> Vec<u8> {
        groups
            .iter()
            .filter(|(_, count)| *count == 1)
            .map(|(rank, _)| *rank)
            .collect()
    };

    if groups[0].1 == 3 {
        let mut tb = vec![groups[0].0];
        tb.extend(kickers(&groups));
        return HandRank {
            category: HandCategory::ThreeOfAKind,
            tiebreakers: tb,
        };
    }

    if groups[0].1 == 2 && groups[1].1 == 2 {
        return HandRank {
            category: HandCategory::TwoPair,
            tiebreakers: vec![groups[0].0, groups[1].0, groups[2].0],
        };
    }

    if groups[0].1 == 2 {
        let mut tb = vec![groups[0].0];
        tb.extend(kickers(&groups));
        return HandRank {
            category: HandCategory::OnePair,
            tiebreakers: tb,
        };
    }

    HandRank {
        category: HandCategory::HighCard,
        tiebreakers: ranks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(specs: &[&str]) -> Vec<Card> {
        specs.iter().map(|s| Card::parse(s).unwrap()).collect()
    }

    fn eval(specs: &[&str]) -> HandRank {
        evaluate(&hand(specs)).unwrap()
    }

    #[test]
    fn test_royal_flush() {
        let rank = eval(&["As", "Ks", "Qs", "Js", "Ts", "2h", "3c"]);
        assert_eq!(rank.category, HandCategory::RoyalFlush);
    }

    #[test]
    fn test_straight_flush() {
        let rank = eval(&["9h", "8h", "7h", "6h", "5h", "2c", "3d"]);
        assert_eq!(rank.category, HandCategory::StraightFlush);
        assert_eq!(rank.tiebreakers, vec![9]);
    }

    #[test]
    fn test_four_of_a_kind() {
        let rank = eval(&["Ah", "As", "Ad", "Ac", "Kh", "2c", "3d"]);
        assert_eq!(rank.category, HandCategory::FourOfAKind);
        assert_eq!(rank.tiebreakers, vec![14, 13]);
    }

    #[test]
    fn test_full_house() {
        let rank = eval(&["Kh", "Ks", "Kd", "Qc", "Qh", "2c", "3d"]);
        assert_eq!(rank.category, HandCategory::FullHouse);
        assert_eq!(rank.tiebreakers, vec![13, 12]);
    }

    #[test]
    fn test_flush() {
        let rank = eval(&["Ac", "Jc", "9c", "6c", "3c", "Kh", "Qd"]);
        assert_eq!(rank.category, HandCategory::Flush);
        assert_eq!(rank.tiebreakers, vec![14, 11, 9, 6, 3]);
    }

    #[test]
    fn test_straight() {
        let rank = eval(&["9h", "8c", "7d", "6s", "5h", "Kc", "2d"]);
        assert_eq!(rank.category, HandCategory::Straight);
        assert_eq!(rank.tiebreakers, vec![9]);
    }

    #[test]
    fn test_wheel_is_five_high_straight() {
        let rank = eval(&["Ah", "2d", "3c", "4s", "5h"]);
        assert_eq!(rank.category, HandCategory::Straight);
        assert_eq!(rank.tiebreakers, vec![5]);

        let six_high = eval(&["6h", "2d", "3c", "4s", "5h"]);
        assert!(six_high > rank, "6-high straight beats the wheel");
    }

    #[test]
    fn test_three_of_a_kind() {
        let rank = eval(&["Jh", "Js", "Jd", "Ac", "Kh", "2c", "3d"]);
        assert_eq!(rank.category, HandCategory::ThreeOfAKind);
        assert_eq!(rank.tiebreakers, vec![11, 14, 13]);
    }

    #[test]
    fn test_two_pair() {
        let rank = eval(&["Ah", "Ad", "Kc", "Ks", "7h", "2c", "3d"]);
        assert_eq!(rank.category, HandCategory::TwoPair);
        assert_eq!(rank.tiebreakers, vec![14, 13, 7]);
    }

    #[test]
    fn test_one_pair() {
        let rank = eval(&["Qh", "Qs", "Ad", "Kc", "7h", "2c", "3d"]);
        assert_eq!(rank.category, HandCategory::OnePair);
        assert_eq!(rank.tiebreakers, vec![12, 14, 13, 7]);
    }

    #[test]
    fn test_high_card() {
        let rank = eval(&["Ah", "Ks", "Qd", "9c", "7h", "4c", "2d"]);
        assert_eq!(rank.category, HandCategory::HighCard);
        assert_eq!(rank.tiebreakers, vec![14, 13, 12, 9, 7]);
    }

    #[test]
    fn test_kicker_decides() {
        let ace_kicker = eval(&["Kh", "As", "Th", "8c", "5d", "3c", "2d"]);
        let queen_kicker = eval(&["Kd", "Qc", "Th", "8c", "5d", "3c", "2d"]);
        // No pair in either: high-card vs high-card here; force pairs instead
        let pair_ace = eval(&["Kh", "Kd", "As", "Th", "8c", "5d", "3c"]);
        let pair_queen = eval(&["Kh", "Kd", "Qs", "Th", "8c", "5d", "3c"]);
        assert!(ace_kicker > queen_kicker);
        assert_eq!(pair_ace.category, HandCategory::OnePair);
        assert!(pair_ace > pair_queen);
    }

    #[test]
    fn test_best_of_seven_prefers_higher_combo() {
        // Board pairs plus a flush: the flush must win out.
        let rank = eval(&["Ah", "Kh", "Qh", "Jh", "9h", "Ac", "Ad"]);
        assert_eq!(rank.category, HandCategory::Flush);
    }

    #[test]
    fn test_exact_tie() {
        let a = eval(&["Ah", "Ks", "Qd", "Jc", "Th"]);
        let b = eval(&["Ad", "Kc", "Qh", "Js", "Tc"]);
        assert_eq!(a, b);
        assert_eq!(a.category, HandCategory::Straight);
    }

    #[test]
    fn test_total_order() {
        let hands = vec![
            eval(&["Ah", "Ks", "Qd", "9c", "7h"]),
            eval(&["Qh", "Qs", "Ad", "Kc", "7h"]),
            eval(&["Ah", "Ad", "Kc", "Ks", "7h"]),
            eval(&["9h", "8c", "7d", "6s", "5h"]),
            eval(&["Ac", "Jc", "9c", "6c", "3c"]),
        ];
        for a in &hands {
            for b in &hands {
                let lt = a < b;
                let gt = a > b;
                let eq = a == b;
                assert_eq!(
                    1,
                    [lt, gt, eq].iter().filter(|x| **x).count(),
                    "exactly one of <, >, == must hold"
                );
            }
        }
    }

    #[test]
    fn test_too_few_cards_fails() {
        let err = evaluate(&hand(&["Ah", "Ks", "Qd", "9c"])).unwrap_err();
        assert_eq!(err, EvalError::TooFewCards(4));
    }

    #[test]
    fn test_determine_winners_tie() {
        let mut hands = BTreeMap::new();
        hands.insert("a".to_string(), eval(&["Ah", "Ks", "Qd", "Jc", "Th"]));
        hands.insert("b".to_string(), eval(&["Ad", "Kc", "Qh", "Js", "Tc"]));
        hands.insert("c".to_string(), eval(&["2h", "2s", "Qd", "Jc", "Th"]));
        assert_eq!(determine_winners(&hands), vec!["a", "b"]);
    }

    #[test]
    fn test_determine_winners_empty() {
        assert!(determine_winners(&BTreeMap::new()).is_empty());
    }
}
