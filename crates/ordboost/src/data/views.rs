//! Permuted views over learn and test datasets.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TrainError};
use crate::training::permutation_block_size;

use super::dataset::{Dataset, ObjectsOrder};
use super::grouping::{Grouping, SamplesGrouping};
use super::permutation::Permutation;

/// Identity of a dataset view, used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViewId {
    /// Learn data in the order of permutation `i`.
    Learn(u32),
    /// Test data in original order.
    Test,
}

/// A dataset seen through one permutation.
#[derive(Debug, Clone, Copy)]
pub struct DataSetView<'a> {
    id: ViewId,
    dataset: &'a Dataset,
    permutation: &'a Permutation,
    grouping: &'a Grouping,
}

impl<'a> DataSetView<'a> {
    #[inline]
    pub fn id(&self) -> ViewId {
        self.id
    }

    #[inline]
    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Original row index of every position.
    #[inline]
    pub fn indices(&self) -> &'a [u32] {
        self.permutation.indices()
    }

    #[inline]
    pub fn grouping(&self) -> &'a Grouping {
        self.grouping
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.grouping.sample_count()
    }

    /// Bin of `feature` for the row at view position `pos`.
    #[inline]
    pub fn bin(&self, feature: usize, pos: usize) -> u8 {
        self.dataset.bin(feature, self.permutation.indices()[pos] as usize)
    }

    /// `values` (original order) gathered into view order.
    pub fn gather<T: Copy + Default>(&self, values: &[T]) -> Vec<T> {
        self.permutation.gather(values)
    }

    /// Baseline in view order, zero when the dataset has none.
    pub fn baseline(&self) -> Vec<f32> {
        match self.dataset.baseline() {
            Some(b) => self.gather(b),
            None => vec![0.0; self.permutation.len()],
        }
    }

    /// Weights in view order, ones when the dataset is unweighted.
    pub fn weights(&self) -> Vec<f32> {
        match self.dataset.weights() {
            Some(w) => self.gather(w),
            None => vec![1.0; self.permutation.len()],
        }
    }
}

#[derive(Debug, Clone)]
struct PermutedLayout {
    permutation: Permutation,
    grouping: Grouping,
}

/// Owner of the learn/test datasets and all learn permutations.
///
/// The last permutation is the identity and serves as the estimation
/// permutation. Random permutation `i` is generated from `seed + i`.
/// Ordered data gets exactly one (identity) permutation.
#[derive(Debug)]
pub struct DataSetsHolder<'a> {
    learn: &'a Dataset,
    test: Option<&'a Dataset>,
    layouts: Vec<PermutedLayout>,
    test_layout: Option<PermutedLayout>,
}

impl<'a> DataSetsHolder<'a> {
    pub fn new(
        learn: &'a Dataset,
        test: Option<&'a Dataset>,
        permutation_count: u32,
        block_size: u32,
        seed: u64,
    ) -> Result<Self, TrainError> {
        if permutation_count == 0 {
            return Err(ConfigError::InvalidPermutationCount.into());
        }
        if let Some(test) = test {
            learn.check_compatible(test)?;
        }
        let count = match learn.order() {
            ObjectsOrder::Ordered => 1,
            ObjectsOrder::Undefined => permutation_count,
        };
        let n = learn.n_rows() as u32;
        let block_size = permutation_block_size(n, block_size);
        let mut layouts = Vec::with_capacity(count as usize);
        for i in 0..count - 1 {
            let (permutation, grouping) =
                Permutation::random(learn.grouping(), block_size, seed.wrapping_add(u64::from(i)));
            layouts.push(PermutedLayout { permutation, grouping });
        }
        layouts.push(PermutedLayout {
            permutation: Permutation::identity(n),
            grouping: learn.grouping().clone(),
        });
        let test_layout = test.map(|t| PermutedLayout {
            permutation: Permutation::identity(t.n_rows() as u32),
            grouping: t.grouping().clone(),
        });
        tracing::debug!(permutations = count, block_size, "created learn permutations");
        Ok(Self {
            learn,
            test,
            layouts,
            test_layout,
        })
    }

    #[inline]
    pub fn learn(&self) -> &'a Dataset {
        self.learn
    }

    #[inline]
    pub fn test(&self) -> Option<&'a Dataset> {
        self.test
    }

    #[inline]
    pub fn has_test(&self) -> bool {
        self.test.is_some()
    }

    #[inline]
    pub fn permutation_count(&self) -> u32 {
        self.layouts.len() as u32
    }

    /// Index of the estimation permutation (always the last one).
    #[inline]
    pub fn estimation_permutation(&self) -> u32 {
        self.permutation_count() - 1
    }

    /// Learn view through permutation `index`.
    pub fn view(&self, index: u32) -> DataSetView<'_> {
        let layout = &self.layouts[index as usize];
        DataSetView {
            id: ViewId::Learn(index),
            dataset: self.learn,
            permutation: &layout.permutation,
            grouping: &layout.grouping,
        }
    }

    pub fn test_view(&self) -> Option<DataSetView<'_>> {
        let (test, layout) = (self.test?, self.test_layout.as_ref()?);
        Some(DataSetView {
            id: ViewId::Test,
            dataset: test,
            permutation: &layout.permutation,
            grouping: &layout.grouping,
        })
    }

    pub fn permutation(&self, index: u32) -> &Permutation {
        &self.layouts[index as usize].permutation
    }
}
