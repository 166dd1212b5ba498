//! Property tests for feature derivation and sampling.
//!
//! Uses proptest to verify:
//! 1. Age bins - every age maps to exactly one bin and bins never go backwards
//! 2. Risk index - monotonic in every input
//! 3. Sampler - exact target size, reproducible, order preserving

use proptest::prelude::*;
use roadsafety::transform::features::{age_group, encode_propulsion, risk_index};
use roadsafety::transform::sampler::{sample, target_size};
use roadsafety::{AgeGroup, Propulsion, Severity};

// ── 1. Age bins ──────────────────────────────────────────────────────

#[test]
fn every_age_in_range_maps_to_exactly_one_bin() {
    for age in 0..=120u32 {
        let matching: Vec<AgeGroup> = AgeGroup::ALL
            .iter()
            .copied()
            .filter(|g| {
                let lower = g.lower_bound();
                let upper = AgeGroup::ALL
                    .iter()
                    .map(|h| h.lower_bound())
                    .filter(|b| *b > lower)
                    .min()
                    .unwrap_or(u32::MAX);
                age >= lower && age < upper
            })
            .collect();
        assert_eq!(matching.len(), 1, "age {age} matched {matching:?}");
        assert_eq!(matching[0], age_group(age));
    }
}

proptest! {
    /// Older never lands in a younger bin.
    #[test]
    fn age_bins_are_monotonic(a in 0u32..=120, b in 0u32..=120) {
        let (young, old) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(age_group(young) <= age_group(old));
    }

    /// A bin's lower bound never exceeds the age placed in it.
    #[test]
    fn age_is_at_least_lower_bound(age in 0u32..=120) {
        prop_assert!(age >= age_group(age).lower_bound());
    }
}

// ── 2. Risk index ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn risk_grows_with_each_input(vehicles in 0u32..50, casualties in 0u32..50) {
        let base = risk_index(vehicles, casualties, Severity::Slight.score());
        prop_assert!(risk_index(vehicles + 1, casualties, Severity::Slight.score()) > base);
        prop_assert!(risk_index(vehicles, casualties + 1, Severity::Slight.score()) > base);
        prop_assert!(risk_index(vehicles, casualties, Severity::Fatal.score()) > base);
    }

    /// Exactly one propulsion flag is set, whatever the code.
    #[test]
    fn propulsion_one_hot(code in proptest::option::of(-5i64..100)) {
        let (propulsion, flags) = encode_propulsion(code);
        prop_assert_eq!(flags.as_array().iter().map(|f| *f as u32).sum::<u32>(), 1);
        prop_assert_eq!(flags.get(propulsion), 1);
        if !matches!(code, Some(1) | Some(2) | Some(3) | Some(8)) {
            prop_assert_eq!(propulsion, Propulsion::Other);
        }
    }
}

// ── 3. Sampler ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sample_size_within_one_percent(n in 100usize..3000, fraction in 0.01..1.0_f64, seed in any::<u64>()) {
        let (kept, summary) = sample((0..n).collect::<Vec<_>>(), fraction, seed);
        let target = fraction * n as f64;
        prop_assert_eq!(kept.len(), target_size(n, fraction));
        prop_assert!((kept.len() as f64 - target).abs() <= (0.01 * target).max(0.5));
        prop_assert_eq!(summary.rows_out, kept.len());
    }

    #[test]
    fn same_seed_same_sample(n in 1usize..500, fraction in 0.01..1.0_f64, seed in any::<u64>()) {
        let (a, _) = sample((0..n).collect::<Vec<_>>(), fraction, seed);
        let (b, _) = sample((0..n).collect::<Vec<_>>(), fraction, seed);
        prop_assert_eq!(a.clone(), b);
        prop_assert!(a.windows(2).all(|w| w[0] < w[1]));
    }
}
