//! Error types for configuration, datasets, training and snapshots.

use std::io;

use thiserror::Error;

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration errors. Raised before any training work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("learning_rate must be positive, got {0}")]
    InvalidLearningRate(f32),

    #[error("iterations must be at least 1")]
    InvalidIterations,

    #[error("permutation_count must be at least 1")]
    InvalidPermutationCount,

    #[error("fold_len_multiplier must be > 1.0, got {0}")]
    InvalidGrowthRate(f64),

    #[error("min_fold_size must be at least 1")]
    InvalidMinFoldSize,

    #[error("tree depth must be in 0..={max}, got {depth}")]
    InvalidDepth { depth: u32, max: u32 },

    #[error("{field} must be non-negative, got {value}")]
    InvalidRegularization { field: &'static str, value: f64 },

    #[error("leaves estimation needs at least one iteration")]
    InvalidLeavesEstimationIterations,

    #[error("device_count must be at least 1")]
    InvalidDeviceCount,

    #[error("pool has just {groups} groups or docs, can't use #{devices} devices to learn on such small pool")]
    InsufficientGroups { groups: u32, devices: u32 },

    #[error("min learn size should be positive")]
    NonPositiveMinEstimationSize,

    #[error("no learn data provider was set")]
    MissingDataProvider,

    #[error("no progress tracker was set")]
    MissingProgressTracker,
}

// =============================================================================
// DatasetError
// =============================================================================

/// Errors raised while assembling a [`Dataset`](crate::data::Dataset).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("dataset has no rows")]
    Empty,

    #[error("{what} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("group sizes sum to {got}, dataset has {expected} rows")]
    GroupSizeMismatch { expected: usize, got: usize },

    #[error("group {index} is empty")]
    EmptyGroup { index: usize },

    #[error("feature count mismatch: expected {expected}, got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },

    #[error("invalid target at row {row}: {value} ({reason})")]
    InvalidTarget {
        row: usize,
        value: f32,
        reason: &'static str,
    },
}

// =============================================================================
// SnapshotError
// =============================================================================

/// Errors that can occur while writing or reading a training snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("not an ordboost snapshot")]
    NotASnapshot,

    #[error("snapshot requires format {major}.{minor} or later")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("snapshot truncated: expected {expected} bytes")]
    Truncated { expected: usize },

    #[error("snapshot does not match the training state: {0}")]
    StateMismatch(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// =============================================================================
// TrainError
// =============================================================================

/// Crate-level training error.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// A programming error: an internal invariant does not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// An API was used out of order.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl TrainError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}

/// Return an invariant error unless `cond` holds.
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::TrainError::invariant(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_invariant;
