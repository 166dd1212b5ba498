//! Sampler: seeded random subset of a record list.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

/// What the Sampler kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub fraction: f64,
    pub seed: u64,
    pub rows_in: usize,
    pub rows_out: usize,
}

/// Number of rows kept for `fraction` of `n`: `round(fraction * n)`, capped at `n`.
pub fn target_size(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).round() as usize).min(n)
}

/// Draw `round(fraction * n)` rows without replacement.
///
/// The same seed, fraction and input always select the same rows, and the
/// selected rows keep their input order. A fraction of 1.0 keeps everything.
pub fn sample<T>(rows: Vec<T>, fraction: f64, seed: u64) -> (Vec<T>, SampleSummary) {
    let rows_in = rows.len();
    let amount = target_size(rows_in, fraction);

    let kept = if amount == rows_in {
        rows
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut selected = rand::seq::index::sample(&mut rng, rows_in, amount).into_vec();
        selected.sort_unstable();

        let mut wanted = selected.into_iter().peekable();
        rows.into_iter()
            .enumerate()
            .filter_map(|(i, row)| {
                if wanted.peek() == Some(&i) {
                    wanted.next();
                    Some(row)
                } else {
                    None
                }
            })
            .collect()
    };

    let summary = SampleSummary {
        fraction,
        seed,
        rows_in,
        rows_out: kept.len(),
    };
    (kept, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_target_size() {
        let (kept, summary) = sample((0..1000).collect::<Vec<_>>(), 0.10, 42);
        assert_eq!(kept.len(), 100);
        assert_eq!(summary.rows_out, 100);
        assert_eq!(summary.rows_in, 1000);
    }

    #[test]
    fn test_same_seed_same_rows() {
        let (a, _) = sample((0..500).collect::<Vec<_>>(), 0.3, 7);
        let (b, _) = sample((0..500).collect::<Vec<_>>(), 0.3, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_selected_rows_keep_input_order() {
        let (kept, _) = sample((0..200).collect::<Vec<_>>(), 0.5, 1);
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_full_fraction_keeps_everything() {
        let rows = vec!["a", "b", "c"];
        let (kept, _) = sample(rows.clone(), 1.0, 99);
        assert_eq!(kept, rows);
    }

    #[test]
    fn test_empty_input() {
        let (kept, summary) = sample(Vec::<u8>::new(), 0.1, 42);
        assert!(kept.is_empty());
        assert_eq!(summary.rows_out, 0);
    }

    #[test]
    fn test_target_size_rounding() {
        assert_eq!(target_size(15, 0.1), 2);
        assert_eq!(target_size(14, 0.1), 1);
        assert_eq!(target_size(3, 1.0), 3);
    }
}
