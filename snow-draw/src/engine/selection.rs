//! Winner selection
//!
//! Every candidate gets a rank key `SHA-256(seed || batch || participant)`
//! and the smallest keys win. For a secret uniformly random seed this is a
//! uniformly random permutation of the pool, independent of the order the
//! pool was enumerated in.
//!
//! Because a candidate's key never changes for a batch, selecting `k`
//! winners one at a time picks exactly the same set as selecting `k` at once.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::types::{BatchId, ParticipantId};

/// Rank key of one candidate
pub fn rank_key(seed: &[u8; 32], batch: BatchId, participant: ParticipantId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(batch.to_key());
    hasher.update(participant.to_key());
    hasher.finalize().into()
}

/// Select up to `take` candidates with the smallest rank keys, in rank order
pub fn select(seed: &[u8; 32], batch: BatchId, pool: &[ParticipantId], take: usize) -> Vec<ParticipantId> {
    let unique: BTreeSet<ParticipantId> = pool.iter().copied().collect();
    let mut ranked: Vec<([u8; 32], ParticipantId)> = unique
        .into_iter()
        .map(|id| (rank_key(seed, batch, id), id))
        .collect();
    ranked.sort_unstable();
    ranked.into_iter().take(take).map(|(_, id)| id).collect()
}

/// Audit digest over the seed, batch and the candidate pool.
///
/// Recorded with every draw so the selection can be recomputed later from
/// the stored seed and the pool snapshot.
pub fn selection_digest(seed: &[u8; 32], batch: BatchId, pool: &[ParticipantId]) -> String {
    let unique: BTreeSet<ParticipantId> = pool.iter().copied().collect();
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(batch.to_key());
    hasher.update((unique.len() as u64).to_be_bytes());
    for id in unique {
        hasher.update(id.to_key());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn pool(n: u32) -> Vec<ParticipantId> {
        (0..n).map(|i| ParticipantId(100_000 + i)).collect()
    }

    #[test]
    fn test_select_is_order_independent() {
        let seed = [5u8; 32];
        let forward = pool(50);
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(select(&seed, BatchId(1), &forward, 7), select(&seed, BatchId(1), &reversed, 7));
        assert_eq!(
            selection_digest(&seed, BatchId(1), &forward),
            selection_digest(&seed, BatchId(1), &reversed)
        );
    }

    #[test]
    fn test_incremental_selection_matches_bulk() {
        let seed = [11u8; 32];
        let mut remaining = pool(20);
        let bulk = select(&seed, BatchId(3), &remaining, 5);

        let mut incremental = Vec::new();
        for _ in 0..5 {
            let one = select(&seed, BatchId(3), &remaining, 1);
            remaining.retain(|id| *id != one[0]);
            incremental.extend(one);
        }
        assert_eq!(incremental, bulk);
    }

    #[test]
    fn test_take_is_bounded_by_pool() {
        let seed = [0u8; 32];
        assert_eq!(select(&seed, BatchId(1), &pool(3), 10).len(), 3);
        assert!(select(&seed, BatchId(1), &[], 10).is_empty());

        let duplicated = vec![ParticipantId(100_000), ParticipantId(100_000)];
        assert_eq!(select(&seed, BatchId(1), &duplicated, 2), vec![ParticipantId(100_000)]);
    }

    #[test]
    fn test_selection_is_uniform() {
        let candidates = pool(4);
        let mut counts = [0u32; 4];
        let mut rng = rand::thread_rng();
        let rounds = 4000;

        for _ in 0..rounds {
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            let winner = select(&seed, BatchId(1), &candidates, 1)[0];
            counts[(winner.value() - 100_000) as usize] += 1;
        }

        // expected 1000 each, standard deviation about 27
        for count in counts {
            assert!((850..=1150).contains(&count), "skewed counts: {:?}", counts);
        }
    }
}
