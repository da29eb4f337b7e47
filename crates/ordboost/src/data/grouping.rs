//! Row grouping (queries) used to keep folds group-consistent.

use crate::error::DatasetError;

/// Group-boundary queries over a row order.
pub trait SamplesGrouping {
    /// Total number of rows.
    fn sample_count(&self) -> u32;

    /// Number of groups. Ungrouped data has one group per row.
    fn group_count(&self) -> u32;

    /// First row of `group`. `group_offset(group_count())` is the row count.
    fn group_offset(&self, group: u32) -> u32;

    /// Smallest group boundary `>= line`, capped at the row count.
    fn next_group_offset_for_line(&self, line: u32) -> u32;
}

/// Concrete grouping of a dataset or a permuted view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    /// Every row is its own group.
    Rows { n: u32 },
    /// `offsets[g]..offsets[g + 1]` are the rows of group `g`.
    Groups { offsets: Vec<u32> },
}

impl Grouping {
    pub fn rows(n: u32) -> Self {
        Grouping::Rows { n }
    }

    /// Build from per-group sizes.
    pub fn from_sizes(sizes: &[u32], n_rows: usize) -> Result<Self, DatasetError> {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        offsets.push(0u32);
        for (index, &size) in sizes.iter().enumerate() {
            if size == 0 {
                return Err(DatasetError::EmptyGroup { index });
            }
            offsets.push(offsets[index] + size);
        }
        let total = offsets.last().copied().unwrap_or(0) as usize;
        if total != n_rows {
            return Err(DatasetError::GroupSizeMismatch {
                expected: n_rows,
                got: total,
            });
        }
        Ok(Grouping::Groups { offsets })
    }

    /// Size of every group, in order.
    pub fn group_sizes(&self) -> Vec<u32> {
        match self {
            Grouping::Rows { n } => vec![1; *n as usize],
            Grouping::Groups { offsets } => offsets.windows(2).map(|w| w[1] - w[0]).collect(),
        }
    }
}

impl SamplesGrouping for Grouping {
    fn sample_count(&self) -> u32 {
        match self {
            Grouping::Rows { n } => *n,
            Grouping::Groups { offsets } => offsets.last().copied().unwrap_or(0),
        }
    }

    fn group_count(&self) -> u32 {
        match self {
            Grouping::Rows { n } => *n,
            Grouping::Groups { offsets } => offsets.len().saturating_sub(1) as u32,
        }
    }

    fn group_offset(&self, group: u32) -> u32 {
        match self {
            Grouping::Rows { n } => group.min(*n),
            Grouping::Groups { offsets } => {
                let last = offsets.len() - 1;
                offsets[(group as usize).min(last)]
            }
        }
    }

    fn next_group_offset_for_line(&self, line: u32) -> u32 {
        match self {
            Grouping::Rows { n } => line.min(*n),
            Grouping::Groups { offsets } => {
                let idx = offsets.partition_point(|&o| o < line);
                offsets
                    .get(idx)
                    .copied()
                    .unwrap_or_else(|| self.sample_count())
            }
        }
    }
}
