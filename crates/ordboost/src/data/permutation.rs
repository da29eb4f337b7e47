//! Random row permutations.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::device;

use super::grouping::Grouping;

/// Bijective remap: position `i` of the permuted order holds original row `indices[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    indices: Vec<u32>,
}

impl Permutation {
    pub fn identity(n: u32) -> Self {
        Self {
            indices: (0..n).collect(),
        }
    }

    /// Shuffle `grouping`'s rows with the generator seeded by `seed`.
    ///
    /// Ungrouped rows are shuffled in blocks of `block_size` consecutive rows.
    /// Grouped rows are shuffled a whole group at a time, so every group stays
    /// contiguous; the returned grouping describes the permuted order.
    pub fn random(grouping: &Grouping, block_size: u32, seed: u64) -> (Self, Grouping) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        match grouping {
            Grouping::Rows { n } => {
                let n = *n;
                let block_size = block_size.max(1);
                let mut blocks: Vec<u32> = (0..n.div_ceil(block_size)).collect();
                blocks.shuffle(&mut rng);
                let indices = blocks
                    .into_iter()
                    .flat_map(|b| b * block_size..((b + 1) * block_size).min(n))
                    .collect();
                (Self { indices }, grouping.clone())
            }
            Grouping::Groups { offsets } => {
                let mut groups: Vec<usize> = (0..offsets.len() - 1).collect();
                groups.shuffle(&mut rng);
                let mut indices = Vec::with_capacity(offsets.last().copied().unwrap_or(0) as usize);
                let mut permuted = Vec::with_capacity(offsets.len());
                permuted.push(0u32);
                for g in groups {
                    indices.extend(offsets[g]..offsets[g + 1]);
                    permuted.push(indices.len() as u32);
                }
                (Self { indices }, Grouping::Groups { offsets: permuted })
            }
        }
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.indices.iter().enumerate().all(|(i, &r)| i as u32 == r)
    }

    /// `src` reordered into this permutation's order.
    pub fn gather<T: Copy + Default>(&self, src: &[T]) -> Vec<T> {
        let mut dst = vec![T::default(); self.indices.len()];
        device::gather(&mut dst, src, &self.indices);
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SamplesGrouping;

    fn assert_bijection(p: &Permutation, n: usize) {
        let mut seen = vec![false; n];
        for &r in p.indices() {
            assert!(!seen[r as usize]);
            seen[r as usize] = true;
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_random_is_bijection_and_seeded() {
        let g = Grouping::rows(97);
        let (a, _) = Permutation::random(&g, 1, 7);
        let (b, _) = Permutation::random(&g, 1, 7);
        let (c, _) = Permutation::random(&g, 1, 8);
        assert_bijection(&a, 97);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_identity());
    }

    #[test]
    fn test_blocks_stay_contiguous() {
        let (p, _) = Permutation::random(&Grouping::rows(20), 4, 3);
        assert_bijection(&p, 20);
        for block in p.indices().chunks(4) {
            assert_eq!(block[0] % 4, 0);
            assert!(block.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn test_groups_stay_contiguous() {
        let g = Grouping::from_sizes(&[2, 3, 1, 4], 10).unwrap();
        let (p, permuted) = Permutation::random(&g, 1, 11);
        assert_bijection(&p, 10);
        assert_eq!(permuted.group_count(), 4);
        let mut sizes = permuted.group_sizes();
        for gi in 0..permuted.group_count() {
            let start = permuted.group_offset(gi) as usize;
            let end = permuted.group_offset(gi + 1) as usize;
            let rows = &p.indices()[start..end];
            assert!(rows.windows(2).all(|w| w[1] == w[0] + 1));
        }
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_gather() {
        let p = Permutation {
            indices: vec![2, 0, 1],
        };
        assert_eq!(p.gather(&[1.0, 2.0, 3.0]), vec![3.0, 1.0, 2.0]);
    }
}
