//! Property-based tests for the hash index.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Hamming distance is a metric on equal-length hashes
//! - BK-tree range search returns exactly what a linear scan returns

use photo_dedup_engine::core::index::{hamming_distance, BkTree, INFINITE_DISTANCE};
use proptest::prelude::*;

fn hex(value: u64) -> String {
    format!("{:016x}", value)
}

/// Flip the given bit positions of `base`
fn perturb(base: u64, bits: &[u32]) -> u64 {
    bits.iter().fold(base, |acc, bit| acc ^ (1u64 << bit))
}

mod hamming_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn distance_matches_popcount(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(hamming_distance(&hex(a), &hex(b)), (a ^ b).count_ones());
        }

        #[test]
        fn distance_is_symmetric(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(
                hamming_distance(&hex(a), &hex(b)),
                hamming_distance(&hex(b), &hex(a))
            );
        }

        #[test]
        fn distance_to_self_is_zero(a in any::<u64>()) {
            prop_assert_eq!(hamming_distance(&hex(a), &hex(a)), 0);
        }

        #[test]
        fn triangle_inequality(a in any::<u64>(), b in any::<u64>(), c in any::<u64>()) {
            let ab = hamming_distance(&hex(a), &hex(b));
            let bc = hamming_distance(&hex(b), &hex(c));
            let ac = hamming_distance(&hex(a), &hex(c));
            prop_assert!(ac <= ab + bc);
        }

        #[test]
        fn case_is_ignored(a in any::<u64>()) {
            let lower = hex(a);
            let upper = lower.to_uppercase();
            prop_assert_eq!(hamming_distance(&lower, &upper), 0);
        }

        #[test]
        fn unequal_lengths_are_infinite(a in any::<u64>(), cut in 1usize..16) {
            let full = hex(a);
            prop_assert_eq!(hamming_distance(&full, &full[cut..]), INFINITE_DISTANCE);
        }
    }
}

mod bktree_props {
    use super::*;

    prop_compose! {
        /// Hashes clustered around a random base so range queries actually hit
        fn clustered_hashes()(
            base in any::<u64>(),
            flips in prop::collection::vec(prop::collection::vec(0u32..64, 0..12), 100..1000),
        ) -> (u64, Vec<u64>) {
            let hashes = flips.iter().map(|bits| perturb(base, bits)).collect();
            (base, hashes)
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn search_matches_linear_scan(
            (base, hashes) in clustered_hashes(),
            query_bits in prop::collection::vec(0u32..64, 0..6),
            max_distance in 0u32..=16,
        ) {
            let mut tree = BkTree::new();
            for (id, hash) in hashes.iter().enumerate() {
                tree.add(&hex(*hash), id);
            }
            let query = hex(perturb(base, &query_bits));

            let mut found = tree.search(&query, max_distance);
            found.sort();

            let expected: Vec<(usize, u32)> = hashes
                .iter()
                .enumerate()
                .map(|(id, hash)| (id, hamming_distance(&hex(*hash), &query)))
                .filter(|(_, distance)| *distance <= max_distance)
                .collect();

            prop_assert_eq!(tree.len(), hashes.len());
            prop_assert_eq!(found, expected);
        }
    }
}
