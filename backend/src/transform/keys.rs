//! KeyAssigner: surrogate keys for the dimension tables.
//!
//! All dimensions draw from one [`KeySequence`] per run, so keys are unique
//! across the whole schema and each dimension owns one contiguous block.
//! Allocation order is fixed by the caller (time, collision, vehicle,
//! casualty), which makes keys reproducible for identical input.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::error::Violation;

/// How natural keys collapse into dimension rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionPolicy {
    /// One row per distinct natural key, in sorted order.
    Deduplicate,
    /// One row per source row, in input order. Natural keys must be unique.
    PerSourceRow,
}

/// Run-wide surrogate key counter, starting at 1.
#[derive(Debug, Clone)]
pub struct KeySequence {
    next: u64,
}

impl KeySequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Reserve `len` consecutive keys.
    pub fn reserve(&mut self, len: usize) -> KeyBlock {
        let block = KeyBlock {
            start: self.next,
            len: len as u64,
        };
        self.next += len as u64;
        block
    }

    /// Next key that would be handed out.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for KeySequence {
    fn default() -> Self {
        Self::new()
    }
}

/// A contiguous range of surrogate keys owned by one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyBlock {
    pub start: u64,
    pub len: u64,
}

impl KeyBlock {
    /// Key at `offset` within the block.
    pub fn key(&self, offset: usize) -> Option<u64> {
        let offset = offset as u64;
        (offset < self.len).then(|| self.start + offset)
    }

    pub fn contains(&self, key: u64) -> bool {
        key >= self.start && key < self.start + self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.start..self.start + self.len
    }
}

/// Natural key -> surrogate key mapping for one dimension.
#[derive(Debug, Clone)]
pub struct KeyAssigner<N: Ord> {
    table: &'static str,
    policy: DimensionPolicy,
    block: KeyBlock,
    mapping: BTreeMap<N, u64>,
}

impl<N: Ord + Clone + Debug> KeyAssigner<N> {
    /// Allocate keys for `naturals` under `policy`.
    ///
    /// Under [`DimensionPolicy::PerSourceRow`] a repeated natural key is a
    /// [`Violation::DuplicateNaturalKey`].
    pub fn assign(
        table: &'static str,
        policy: DimensionPolicy,
        naturals: impl IntoIterator<Item = N>,
        sequence: &mut KeySequence,
    ) -> Result<Self, Violation> {
        let ordered: Vec<N> = match policy {
            DimensionPolicy::Deduplicate => naturals
                .into_iter()
                .collect::<BTreeSet<N>>()
                .into_iter()
                .collect(),
            DimensionPolicy::PerSourceRow => {
                let all: Vec<N> = naturals.into_iter().collect();
                let mut seen = BTreeSet::new();
                for natural in &all {
                    if !seen.insert(natural) {
                        return Err(Violation::DuplicateNaturalKey {
                            table,
                            natural_key: format!("{natural:?}"),
                        });
                    }
                }
                all
            }
        };

        let block = sequence.reserve(ordered.len());
        let mapping = ordered.into_iter().zip(block.iter()).collect();

        Ok(Self {
            table,
            policy,
            block,
            mapping,
        })
    }

    pub fn get(&self, natural: &N) -> Option<u64> {
        self.mapping.get(natural).copied()
    }

    /// Like [`get`](Self::get), but an unknown natural key is a violation.
    pub fn resolve(&self, natural: &N) -> Result<u64, Violation> {
        self.get(natural)
            .ok_or_else(|| Violation::UnmappedNaturalKey {
                table: self.table,
                natural_key: format!("{natural:?}"),
            })
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn policy(&self) -> DimensionPolicy {
        self.policy
    }

    pub fn block(&self) -> KeyBlock {
        self.block
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// `(natural, key)` pairs in key order.
    pub fn entries(&self) -> Vec<(&N, u64)> {
        let mut entries: Vec<(&N, u64)> = self.mapping.iter().map(|(n, k)| (n, *k)).collect();
        entries.sort_by_key(|(_, k)| *k);
        entries
    }

    /// Overwrite one mapping entry. Only used to corrupt mappings in tests.
    #[cfg(test)]
    pub(crate) fn remap(&mut self, natural: N, key: u64) {
        self.mapping.insert(natural, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_contiguous_and_disjoint() {
        let mut seq = KeySequence::new();
        let a = seq.reserve(3);
        let b = seq.reserve(2);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![4, 5]);
        assert!(!a.contains(4));
        assert_eq!(seq.peek(), 6);
        assert_eq!(b.key(1), Some(5));
        assert_eq!(b.key(2), None);
    }

    #[test]
    fn test_deduplicate_sorts_and_collapses() {
        let mut seq = KeySequence::new();
        let assigner = KeyAssigner::assign(
            "dim_time",
            DimensionPolicy::Deduplicate,
            vec![(2023, 5), (2023, 1), (2023, 5)],
            &mut seq,
        )
        .unwrap();

        assert_eq!(assigner.len(), 2);
        assert_eq!(assigner.get(&(2023, 1)), Some(1));
        assert_eq!(assigner.get(&(2023, 5)), Some(2));
    }

    #[test]
    fn test_per_source_row_keeps_input_order() {
        let mut seq = KeySequence::new();
        seq.reserve(10);
        let assigner = KeyAssigner::assign(
            "dim_collision",
            DimensionPolicy::PerSourceRow,
            vec!["B".to_string(), "A".to_string()],
            &mut seq,
        )
        .unwrap();

        assert_eq!(assigner.resolve(&"B".to_string()).unwrap(), 11);
        assert_eq!(assigner.resolve(&"A".to_string()).unwrap(), 12);
        let entries = assigner.entries();
        assert_eq!(entries[0].1, 11);
    }

    #[test]
    fn test_per_source_row_rejects_duplicates() {
        let mut seq = KeySequence::new();
        let err = KeyAssigner::assign(
            "dim_collision",
            DimensionPolicy::PerSourceRow,
            vec!["A", "A"],
            &mut seq,
        )
        .unwrap_err();
        assert!(matches!(err, Violation::DuplicateNaturalKey { .. }));
    }

    #[test]
    fn test_unknown_natural_key() {
        let mut seq = KeySequence::new();
        let assigner =
            KeyAssigner::assign("dim_vehicle", DimensionPolicy::PerSourceRow, vec![0usize], &mut seq)
                .unwrap();
        assert_eq!(assigner.get(&7), None);
        assert!(matches!(
            assigner.resolve(&7),
            Err(Violation::UnmappedNaturalKey { table: "dim_vehicle", .. })
        ));
    }
}
