//! Half-open index ranges over a permutation's row order.

use serde::{Deserialize, Serialize};

/// Half-open range `[left, right)` of row positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Slice {
    pub left: u32,
    pub right: u32,
}

impl Slice {
    #[inline]
    pub const fn new(left: u32, right: u32) -> Self {
        Self { left, right }
    }

    /// Slice covering `[0, size)`.
    #[inline]
    pub const fn full(size: u32) -> Self {
        Self { left: 0, right: size }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.right.saturating_sub(self.left) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.right <= self.left
    }

    /// Whether `other` lies fully inside this slice.
    #[inline]
    pub fn contains(&self, other: &Slice) -> bool {
        other.left >= self.left && other.right <= self.right
    }

    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.left as usize..self.right as usize
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.left, self.right)
    }
}
