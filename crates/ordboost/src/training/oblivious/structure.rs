//! Oblivious tree structure and model.
//!
//! Every level of an oblivious tree applies the same split to all rows, so a
//! row's leaf is the bit pattern of its split outcomes:
//!
//! ```text
//! leaf = Σ_level [bin(feature_level) > border_level] << level
//! ```

use serde::{Deserialize, Serialize};

use crate::data::{DataSetView, Dataset};
use crate::training::weak::{StructureBins, WeakModel};

/// Rows with `bin > border` go to the right (bit set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinarySplit {
    pub feature: u32,
    pub border: u8,
}

impl BinarySplit {
    #[inline]
    pub fn goes_right(&self, bin: u8) -> bool {
        bin > self.border
    }
}

/// Sequence of splits, one per level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObliviousTreeStructure {
    pub splits: Vec<BinarySplit>,
}

impl ObliviousTreeStructure {
    pub fn new(splits: Vec<BinarySplit>) -> Self {
        Self { splits }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.splits.len()
    }

    /// Leaf of original row `row` of `dataset`.
    #[inline]
    pub fn leaf_of_row(&self, dataset: &Dataset, row: usize) -> u32 {
        self.splits
            .iter()
            .enumerate()
            .map(|(level, split)| {
                u32::from(split.goes_right(dataset.bin(split.feature as usize, row))) << level
            })
            .sum()
    }
}

impl StructureBins for ObliviousTreeStructure {
    #[inline]
    fn leaf_count(&self) -> usize {
        1 << self.depth()
    }

    #[inline]
    fn leaf_of(&self, view: &DataSetView<'_>, pos: usize) -> u32 {
        self.leaf_of_row(view.dataset(), view.indices()[pos] as usize)
    }
}

/// An oblivious tree with estimated leaf values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousTreeModel {
    pub structure: ObliviousTreeStructure,
    pub values: Vec<f32>,
    /// Total row weight that fell into each leaf during estimation.
    pub weights: Vec<f32>,
}

impl ObliviousTreeModel {
    pub fn with_values(structure: ObliviousTreeStructure, values: Vec<f32>, weights: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), structure.leaf_count());
        debug_assert_eq!(weights.len(), structure.leaf_count());
        Self {
            structure,
            values,
            weights,
        }
    }

    /// Contribution of this tree to original row `row` of `dataset`.
    #[inline]
    pub fn predict_row(&self, dataset: &Dataset, row: usize) -> f32 {
        self.values[self.structure.leaf_of_row(dataset, row) as usize]
    }
}

impl WeakModel for ObliviousTreeModel {
    type Structure = ObliviousTreeStructure;

    fn from_structure(structure: &ObliviousTreeStructure) -> Self {
        let leaves = structure.leaf_count();
        Self {
            structure: structure.clone(),
            values: vec![0.0; leaves],
            weights: vec![0.0; leaves],
        }
    }

    fn rescale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v = (f64::from(*v) * factor) as f32;
        }
    }

    #[inline]
    fn value(&self, leaf: u32) -> f32 {
        self.values[leaf as usize]
    }
}
