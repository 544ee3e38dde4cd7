//! Per-chain deterministic seeding (spec §5: "same base seed + same chain
//! count must reproduce identical samples").

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Derive chain `chain_index`'s RNG from `base_seed`. Chains are seeded
/// `base_seed + chain_index + 1` (never `base_seed` itself, so that a
/// 1-chain run and a single chain within a larger run never collide with
/// whatever consumed `base_seed` directly), wrapping at `u32::MAX`.
pub fn chain_rng(base_seed: u64, chain_index: usize) -> ChaCha8Rng {
    let seed = base_seed.wrapping_add(chain_index as u64).wrapping_add(1) % (1u64 << 32);
    ChaCha8Rng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn distinct_chain_indices_yield_distinct_streams() {
        let mut a = chain_rng(42, 0);
        let mut b = chain_rng(42, 1);
        let x: f64 = a.gen();
        let y: f64 = b.gen();
        assert_ne!(x, y);
    }

    #[test]
    fn same_seed_and_index_reproduce_identical_streams() {
        let mut a = chain_rng(7, 3);
        let mut b = chain_rng(7, 3);
        let xs: Vec<f64> = (0..10).map(|_| a.gen()).collect();
        let ys: Vec<f64> = (0..10).map(|_| b.gen()).collect();
        assert_eq!(xs, ys);
    }
}
