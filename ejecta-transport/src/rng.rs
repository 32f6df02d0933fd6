//! Deterministic per-packet random-number generator seeding.
//!
//! Every packet owns its own generator, reseeded from a pure function of
//! `(base_seed, iteration, packet_index)`: two runs with identical inputs
//! and identical thread count must produce identical results, and different
//! thread counts must not change any packet's individual outcome because
//! nothing about its seed depends on which worker processes it or in what
//! order.

use rand_pcg::Pcg64Mcg;

/// Mixes three `u64`s into one via the SplitMix64 finalizer, run three
/// times over an XOR-folded accumulator. Cheap, well-distributed, and has
/// no dependence on iteration order across packets.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derives the 128-bit seed for packet `packet_index` of `iteration`, given
/// the run's `base_seed`.
#[must_use]
pub fn packet_seed(base_seed: u64, iteration: u64, packet_index: u64) -> u128 {
    let lo = splitmix64(base_seed ^ splitmix64(iteration ^ splitmix64(packet_index)));
    let hi = splitmix64(lo ^ packet_index.rotate_left(32) ^ iteration.rotate_left(16));
    (u128::from(hi) << 64) | u128::from(lo)
}

/// Builds the packet-local generator for `packet_index` of `iteration`.
#[must_use]
pub fn packet_rng(base_seed: u64, iteration: u64, packet_index: u64) -> Pcg64Mcg {
    Pcg64Mcg::new(packet_seed(base_seed, iteration, packet_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_pure_function_of_inputs() {
        assert_eq!(packet_seed(7, 2, 100), packet_seed(7, 2, 100));
    }

    #[test]
    fn seed_differs_across_packets() {
        assert_ne!(packet_seed(7, 2, 100), packet_seed(7, 2, 101));
    }

    #[test]
    fn seed_differs_across_iterations() {
        assert_ne!(packet_seed(7, 2, 100), packet_seed(7, 3, 100));
    }

    #[test]
    fn seed_differs_across_base_seeds() {
        assert_ne!(packet_seed(7, 2, 100), packet_seed(8, 2, 100));
    }
}
