// ============================================================
// Layer 3 — Polarity Label Space
// ============================================================
// The number of polarity classes is never configured blindly:
// it is inferred from the labels actually present in the
// training set, and the set must be dense.
//
//   {0, 1, 2}  → 3 classes
//   {0, 2}     → rejected (1 is missing)
//   {1, 2, 3}  → rejected (does not start at 0)
//
// A config may pin the dimensionality instead. Then every
// observed label only has to fit below the pinned value, so a
// single-class toy set labelled `2` still trains a 3-way head.

use crate::domain::error::{AbsaError, AbsaResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpace {
    dim: usize,
}

impl LabelSpace {
    pub fn infer(labels: impl IntoIterator<Item = usize>, pinned: Option<usize>) -> AbsaResult<Self> {
        let observed: BTreeSet<usize> = labels.into_iter().collect();

        let (min, max) = match (observed.first(), observed.last()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => return Err(AbsaError::data("no polarity labels in the training set")),
        };

        if let Some(dim) = pinned {
            if dim == 0 {
                return Err(AbsaError::config("polarities_dim must be at least 1"));
            }
            if max >= dim {
                return Err(AbsaError::data(format!(
                    "polarity label {max} does not fit polarities_dim = {dim}; labels must lie in [0, {}]",
                    dim - 1
                )));
            }
            return Ok(Self { dim });
        }

        if observed.len() != max - min + 1 {
            let missing: Vec<usize> = (min..=max).filter(|l| !observed.contains(l)).collect();
            return Err(AbsaError::data(format!(
                "polarity labels are not contiguous, missing {missing:?} in [{min}, {max}]"
            )));
        }
        if min != 0 {
            return Err(AbsaError::data(format!(
                "polarity labels must start at 0, smallest observed label is {min}"
            )));
        }

        Ok(Self { dim: max - min + 1 })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dense_labels() {
        let space = LabelSpace::infer([2, 0, 1, 1, 0], None).unwrap();
        assert_eq!(space.dim(), 3);
    }

    #[test]
    fn test_gap_is_rejected() {
        let err = LabelSpace::infer([0, 2], None).unwrap_err();
        assert!(matches!(err, AbsaError::Data(_)));
    }

    #[test]
    fn test_offset_start_is_rejected() {
        assert!(LabelSpace::infer([1, 2, 3], None).is_err());
    }

    #[test]
    fn test_pinned_dim_accepts_sparse_labels() {
        let space = LabelSpace::infer([2], Some(3)).unwrap();
        assert_eq!(space.dim(), 3);
        assert!(LabelSpace::infer([3], Some(3)).is_err());
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(LabelSpace::infer(Vec::<usize>::new(), None).is_err());
    }

    proptest! {
        #[test]
        fn prop_dim_is_max_minus_min_plus_one(n in 1usize..12, extra in proptest::collection::vec(0usize..12, 0..20)) {
            let labels: Vec<usize> = (0..n).chain(extra.into_iter().filter(|l| *l < n)).collect();
            let space = LabelSpace::infer(labels, None).unwrap();
            prop_assert_eq!(space.dim(), n);
        }
    }
}
