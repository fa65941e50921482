use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use simsweep_core::{CacheSizeKib, Combination, MatrixTriple, Predictor};

/// The three sweep dimensions, each an ordered list of discrete values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// L1 data cache sizes in KiB (outermost loop).
    #[serde(default = "Dimensions::default_cache_sizes")]
    pub cache_sizes_kib: Vec<CacheSizeKib>,
    /// Branch predictor variants (middle loop).
    #[serde(default = "Dimensions::default_predictors")]
    pub predictors: Vec<Predictor>,
    /// Workload matrix triples (innermost loop).
    #[serde(default = "Dimensions::default_matrix_sizes")]
    pub matrix_sizes: Vec<MatrixTriple>,
}

impl Dimensions {
    fn default_cache_sizes() -> Vec<CacheSizeKib> {
        [16, 24, 32, 48]
            .into_iter()
            .map(CacheSizeKib::from_raw)
            .collect()
    }

    fn default_predictors() -> Vec<Predictor> {
        vec![Predictor::Local, Predictor::Tournament]
    }

    fn default_matrix_sizes() -> Vec<MatrixTriple> {
        vec![MatrixTriple::new(4, 4, 4), MatrixTriple::new(6, 6, 6)]
    }

    /// Number of combinations in the cartesian product.
    pub fn len(&self) -> usize {
        self.cache_sizes_kib.len() * self.predictors.len() * self.matrix_sizes.len()
    }

    /// Returns `true` when any dimension is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerates every combination, cache size outermost and matrix innermost.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            dims: self,
            next: 0,
            total: self.len(),
        }
    }

    /// Returns `true` when every parameter of `combo` appears in its dimension.
    pub fn contains(&self, combo: &Combination) -> bool {
        self.cache_sizes_kib.contains(&combo.cache_size)
            && self.predictors.contains(&combo.predictor)
            && self.matrix_sizes.contains(&combo.matrix)
    }

    /// Reports the first dimension holding a repeated value, if any.
    ///
    /// Repeats would make two grid points share one identity.
    pub fn find_duplicate(&self) -> Option<(&'static str, String)> {
        first_repeat(&self.cache_sizes_kib)
            .map(|value| ("cache size", value.to_string()))
            .or_else(|| first_repeat(&self.predictors).map(|value| ("predictor", value.to_string())))
            .or_else(|| first_repeat(&self.matrix_sizes).map(|value| ("matrix size", value.to_string())))
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            cache_sizes_kib: Self::default_cache_sizes(),
            predictors: Self::default_predictors(),
            matrix_sizes: Self::default_matrix_sizes(),
        }
    }
}

fn first_repeat<T: Eq + Hash>(values: &[T]) -> Option<&T> {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().find(|value| !seen.insert(*value))
}

/// Lazy iterator over the grid. Cloning or calling
/// [`Dimensions::combinations`] again restarts the enumeration.
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    dims: &'a Dimensions,
    next: usize,
    total: usize,
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let inner = self.dims.matrix_sizes.len();
        let middle = self.dims.predictors.len();
        let idx = self.next;
        self.next += 1;
        Some(Combination::new(
            self.dims.cache_sizes_kib[idx / (middle * inner)],
            self.dims.predictors[(idx / inner) % middle],
            self.dims.matrix_sizes[idx % inner],
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Dimensions {
        Dimensions {
            cache_sizes_kib: vec![CacheSizeKib::from_raw(16), CacheSizeKib::from_raw(32)],
            predictors: vec![Predictor::Local, Predictor::Tournament],
            matrix_sizes: vec![MatrixTriple::new(4, 4, 4)],
        }
    }

    #[test]
    fn enumeration_order_is_nested() {
        let ids: Vec<String> = small()
            .combinations()
            .map(|combo| combo.identity().into())
            .collect();
        assert_eq!(
            ids,
            vec![
                "l1d:16 BP:local M:4,4,4",
                "l1d:16 BP:tourn M:4,4,4",
                "l1d:32 BP:local M:4,4,4",
                "l1d:32 BP:tourn M:4,4,4",
            ]
        );
    }

    #[test]
    fn empty_dimension_yields_nothing() {
        let mut dims = small();
        dims.predictors.clear();
        assert!(dims.is_empty());
        assert_eq!(dims.combinations().count(), 0);
    }

    #[test]
    fn duplicates_are_reported() {
        let mut dims = small();
        assert!(dims.find_duplicate().is_none());
        dims.matrix_sizes.push(MatrixTriple::new(4, 4, 4));
        assert_eq!(
            dims.find_duplicate(),
            Some(("matrix size", "4,4,4".to_string()))
        );
    }

    #[test]
    fn defaults_cover_sixteen_points() {
        assert_eq!(Dimensions::default().combinations().len(), 16);
    }
}
