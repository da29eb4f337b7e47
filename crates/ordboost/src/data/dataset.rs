//! Quantized training dataset.

use ndarray::{Array2, ArrayView1};

use crate::error::DatasetError;

use super::grouping::Grouping;

/// Row order semantics of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectsOrder {
    /// Rows may be freely permuted.
    #[default]
    Undefined,
    /// Rows are ordered (e.g. by time) and must not be permuted.
    Ordered,
}

/// The quantized dataset consumed by training.
///
/// # Storage Layout
///
/// Feature bins are stored in **feature-major** layout: `[n_features, n_rows]`.
/// A feature with `n_bins` distinct bins yields `n_bins - 1` split borders;
/// a row goes right of border `b` when its bin is `> b`.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use ordboost::data::Dataset;
///
/// let bins = array![[0u8, 1, 2, 1], [1, 1, 0, 0]];
/// let ds = Dataset::new(bins, vec![0.5, 1.0, 2.0, 1.5]).unwrap();
/// assert_eq!(ds.n_rows(), 4);
/// assert_eq!(ds.n_bins(0), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<u8>,
    n_bins: Vec<u32>,
    targets: Vec<f32>,
    weights: Option<Vec<f32>>,
    baseline: Option<Vec<f32>>,
    order: ObjectsOrder,
    grouping: Grouping,
}

impl Dataset {
    /// Create a dataset from feature-major bins and per-row targets.
    pub fn new(features: Array2<u8>, targets: Vec<f32>) -> Result<Self, DatasetError> {
        let n_rows = features.ncols();
        if n_rows == 0 {
            return Err(DatasetError::Empty);
        }
        if targets.len() != n_rows {
            return Err(DatasetError::LengthMismatch {
                what: "targets",
                expected: n_rows,
                got: targets.len(),
            });
        }
        let n_bins = features
            .rows()
            .into_iter()
            .map(|row| row.iter().copied().max().map_or(1, |m| u32::from(m) + 1))
            .collect();
        Ok(Self {
            features,
            n_bins,
            targets,
            weights: None,
            baseline: None,
            order: ObjectsOrder::Undefined,
            grouping: Grouping::rows(n_rows as u32),
        })
    }

    /// Attach per-row weights.
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self, DatasetError> {
        self.check_len("weights", weights.len())?;
        self.weights = Some(weights);
        Ok(self)
    }

    /// Attach a baseline (initial prediction) per row.
    pub fn with_baseline(mut self, baseline: Vec<f32>) -> Result<Self, DatasetError> {
        self.check_len("baseline", baseline.len())?;
        self.baseline = Some(baseline);
        Ok(self)
    }

    /// Group consecutive rows. Sizes must be positive and sum to the row count.
    pub fn with_group_sizes(mut self, sizes: &[u32]) -> Result<Self, DatasetError> {
        self.grouping = Grouping::from_sizes(sizes, self.n_rows())?;
        Ok(self)
    }

    pub fn with_order(mut self, order: ObjectsOrder) -> Self {
        self.order = order;
        self
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<(), DatasetError> {
        if got != self.n_rows() {
            return Err(DatasetError::LengthMismatch {
                what,
                expected: self.n_rows(),
                got,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.features.ncols()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.nrows()
    }

    /// Number of distinct bins of `feature`.
    #[inline]
    pub fn n_bins(&self, feature: usize) -> u32 {
        self.n_bins[feature]
    }

    /// Bins of one feature across all rows, in original order.
    #[inline]
    pub fn feature_bins(&self, feature: usize) -> ArrayView1<'_, u8> {
        self.features.row(feature)
    }

    #[inline]
    pub fn bin(&self, feature: usize, row: usize) -> u8 {
        self.features[[feature, row]]
    }

    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    #[inline]
    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    /// Weight of `row`, 1.0 when unweighted.
    #[inline]
    pub fn weight(&self, row: usize) -> f32 {
        self.weights.as_ref().map_or(1.0, |w| w[row])
    }

    #[inline]
    pub fn baseline(&self) -> Option<&[f32]> {
        self.baseline.as_deref()
    }

    #[inline]
    pub fn order(&self) -> ObjectsOrder {
        self.order
    }

    #[inline]
    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    /// Check that test features are compatible with this (learn) dataset.
    pub fn check_compatible(&self, other: &Dataset) -> Result<(), DatasetError> {
        if other.n_features() != self.n_features() {
            return Err(DatasetError::FeatureCountMismatch {
                expected: self.n_features(),
                got: other.n_features(),
            });
        }
        Ok(())
    }
}
