//! Uniform random pairing for a donation round.

use rand::seq::SliceRandom;
use rand::Rng;

/// One donor/recipient pairing for a single round.
///
/// Roles hold for this round only. Because every round reshuffles
/// independently, an agent may land the donor role in consecutive rounds;
/// strict alternation is deliberately not enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair<T> {
    pub donor: T,
    pub recipient: T,
}

/// Shuffle the roster and group consecutive entries into pairs.
///
/// The roster length must be even; callers enforce that precondition before
/// any state is touched. Deterministic given a seeded `rng`.
pub fn random_pairs<T, R: Rng>(roster: &[T], rng: &mut R) -> Vec<Pair<T>>
where
    T: Clone,
{
    debug_assert!(roster.len() % 2 == 0, "roster must be even");
    let mut shuffled: Vec<T> = roster.to_vec();
    shuffled.shuffle(rng);

    shuffled
        .chunks_exact(2)
        .map(|pair| Pair {
            donor: pair[0].clone(),
            recipient: pair[1].clone(),
        })
        .collect()
}
