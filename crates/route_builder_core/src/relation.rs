//! Many-to-many membership diffing.
//!
//! # Invariants
//! - An absent request means "leave the relation alone"; an empty request
//!   means "remove everything".
//! - `to_add` and `to_remove` are disjoint.

use std::collections::BTreeSet;

/// Changes needed to turn the current membership into the requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDiff<T: Ord> {
    pub to_add: BTreeSet<T>,
    pub to_remove: BTreeSet<T>,
}

impl<T: Ord> RelationDiff<T> {
    pub fn unchanged() -> Self {
        Self {
            to_add: BTreeSet::new(),
            to_remove: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Computes additions and removals against a snapshot of `current`.
///
/// Duplicates in `requested` collapse to one member.
pub fn diff_relation<T>(current: &BTreeSet<T>, requested: Option<&[T]>) -> RelationDiff<T>
where
    T: Ord + Clone,
{
    let Some(requested) = requested else {
        return RelationDiff::unchanged();
    };

    let requested: BTreeSet<T> = requested.iter().cloned().collect();
    RelationDiff {
        to_add: requested.difference(current).cloned().collect(),
        to_remove: current.difference(&requested).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::diff_relation;
    use std::collections::BTreeSet;

    fn set(values: &[i64]) -> BTreeSet<i64> {
        values.iter().copied().collect()
    }

    #[test]
    fn absent_request_is_a_no_op() {
        let diff = diff_relation(&set(&[1, 2]), None);
        assert!(diff.is_empty());
    }

    #[test]
    fn empty_request_removes_everything() {
        let diff = diff_relation(&set(&[1, 2]), Some(&[][..]));
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, set(&[1, 2]));
    }

    #[test]
    fn computes_set_differences_and_collapses_duplicates() {
        let diff = diff_relation(&set(&[1, 2, 3]), Some(&[3, 4, 4, 5][..]));
        assert_eq!(diff.to_add, set(&[4, 5]));
        assert_eq!(diff.to_remove, set(&[1, 2]));
        assert!(diff.to_add.is_disjoint(&diff.to_remove));
    }

    #[test]
    fn matches_set_algebra_over_small_universe() {
        // Every pair of subsets of {0,1,2,3}.
        for current_mask in 0u8..16 {
            for requested_mask in 0u8..16 {
                let current: BTreeSet<i64> =
                    (0..4i64).filter(|bit| current_mask & (1u8 << *bit) != 0).collect();
                let requested: Vec<i64> =
                    (0..4i64).filter(|bit| requested_mask & (1u8 << *bit) != 0).collect();
                let requested_set: BTreeSet<i64> = requested.iter().copied().collect();

                let diff = diff_relation(&current, Some(requested.as_slice()));
                let expected_add: BTreeSet<i64> =
                    requested_set.difference(&current).copied().collect();
                let expected_remove: BTreeSet<i64> =
                    current.difference(&requested_set).copied().collect();
                assert_eq!(diff.to_add, expected_add);
                assert_eq!(diff.to_remove, expected_remove);
                assert!(diff.to_add.is_disjoint(&diff.to_remove));
            }
        }
    }
}
