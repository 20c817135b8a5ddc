//! Statistical validation of deal + hand evaluation.
//!
//! Simulates many 7-card Texas Hold'em deals with a seeded RNG and checks
//! that the observed category distribution of the best 5-card hand matches
//! the known combinatorial probabilities for a 52-card deck. With 200 000
//! trials the tolerance bands below are far wider than the 99.9% confidence
//! interval, so flaky failures are extremely unlikely.

use std::collections::HashMap;

use homegame_shared::{evaluate, Deck, HandCategory};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const NUM_TRIALS: usize = 200_000;

/// (category, expected probability, tolerance). Probabilities are the
/// best-5-of-7 frequencies over all C(52,7) = 133 784 560 hands; straight
/// flush and royal flush are kept separate.
const EXPECTED: [(HandCategory, f64, f64); 10] = [
    (HandCategory::HighCard, 0.1741, 0.010),
    (HandCategory::OnePair, 0.4383, 0.010),
    (HandCategory::TwoPair, 0.2350, 0.010),
    (HandCategory::ThreeOfAKind, 0.0483, 0.005),
    (HandCategory::Straight, 0.0462, 0.005),
    (HandCategory::Flush, 0.0303, 0.005),
    (HandCategory::FullHouse, 0.0260, 0.005),
    (HandCategory::FourOfAKind, 0.00168, 0.002),
    (HandCategory::StraightFlush, 0.000279, 0.001),
    (HandCategory::RoyalFlush, 0.000032, 0.001),
];

#[test]
fn test_seven_card_category_distribution() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut counts: HashMap<HandCategory, usize> = HashMap::new();

    for _ in 0..NUM_TRIALS {
        let mut deck = Deck::shuffled(&mut rng);
        let cards = deck.deal(7).unwrap();
        let best = evaluate(&cards).unwrap();
        *counts.entry(best.category).or_insert(0) += 1;
    }

    assert_eq!(counts.values().sum::<usize>(), NUM_TRIALS);

    for (category, expected, tolerance) in EXPECTED {
        let observed = *counts.get(&category).unwrap_or(&0) as f64 / NUM_TRIALS as f64;
        let diff = (observed - expected).abs();
        assert!(
            diff <= tolerance,
            "{:?}: observed {:.5} vs expected {:.5} (diff {:.5} > tolerance {:.5})",
            category,
            observed,
            expected,
            diff,
            tolerance
        );
    }
}

#[test]
fn test_no_duplicates_in_deals() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    for _ in 0..100 {
        let mut deck = Deck::shuffled(&mut rng);
        let cards = deck.deal(7).unwrap();
        for i in 0..cards.len() {
            for j in (i + 1)..cards.len() {
                assert_ne!(cards[i], cards[j]);
            }
        }
    }
}
