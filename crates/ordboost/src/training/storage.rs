//! Per-(permutation, fold) storage plus the estimation slot.

use serde::{Deserialize, Serialize};

use crate::device::{Mapping, MirrorBuffer};
use crate::error::{ensure_invariant, TrainError};
use crate::slice::Slice;

/// Address of a value in a [`FoldStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelSlot {
    Fold { permutation: u32, fold: u32 },
    Estimation,
}

/// One `T` per fold of every learn permutation, plus one for estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldStorage<T> {
    pub fold_data: Vec<Vec<T>>,
    pub estimation: T,
}

impl<T> FoldStorage<T> {
    /// Build from fold counts per permutation.
    pub fn create(
        fold_counts: &[usize],
        mut fold: impl FnMut(u32, u32) -> T,
        estimation: T,
    ) -> Self {
        let fold_data = fold_counts
            .iter()
            .enumerate()
            .map(|(p, &count)| (0..count).map(|f| fold(p as u32, f as u32)).collect())
            .collect();
        Self {
            fold_data,
            estimation,
        }
    }

    /// Like [`create`](Self::create) with a fallible per-fold constructor.
    pub fn try_create<E>(
        fold_counts: &[usize],
        mut fold: impl FnMut(u32, u32) -> Result<T, E>,
        estimation: T,
    ) -> Result<Self, E> {
        let fold_data = fold_counts
            .iter()
            .enumerate()
            .map(|(p, &count)| (0..count).map(|f| fold(p as u32, f as u32)).collect())
            .collect::<Result<_, E>>()?;
        Ok(Self {
            fold_data,
            estimation,
        })
    }

    #[inline]
    pub fn get(&self, permutation: u32, fold: u32) -> &T {
        &self.fold_data[permutation as usize][fold as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, permutation: u32, fold: u32) -> &mut T {
        &mut self.fold_data[permutation as usize][fold as usize]
    }

    pub fn slot_mut(&mut self, slot: ModelSlot) -> &mut T {
        match slot {
            ModelSlot::Fold { permutation, fold } => self.get_mut(permutation, fold),
            ModelSlot::Estimation => &mut self.estimation,
        }
    }

    pub fn permutation_count(&self) -> usize {
        self.fold_data.len()
    }

    /// Fold counts per permutation.
    pub fn shape(&self) -> Vec<usize> {
        self.fold_data.iter().map(Vec::len).collect()
    }

    /// Apply `f` to every fold value and to the estimation value.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        self.fold_data.iter_mut().flatten().for_each(&mut f);
        f(&mut self.estimation);
    }
}

/// Running prediction for the rows `slice` of one view, replicated on every
/// device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CursorState", try_from = "CursorState")]
pub struct Cursor {
    slice: Slice,
    buffer: MirrorBuffer<f32>,
}

/// Host form of a [`Cursor`] in snapshots. The device mapping is not stored.
#[derive(Serialize, Deserialize)]
struct CursorState {
    values: Vec<f32>,
}

impl From<Cursor> for CursorState {
    fn from(cursor: Cursor) -> Self {
        Self {
            values: cursor.buffer.into_vec(),
        }
    }
}

impl TryFrom<CursorState> for Cursor {
    type Error = TrainError;

    fn try_from(state: CursorState) -> Result<Self, TrainError> {
        Cursor::new(Mapping::mirror(state.values.len(), 1), &state.values)
    }
}

impl Cursor {
    /// Cursor over `[0, values.len())` with the given mirror mapping.
    pub fn new(mapping: Mapping, values: &[f32]) -> Result<Self, TrainError> {
        ensure_invariant!(mapping.is_mirror(), "cursor mapping must be a mirror, got {:?}", mapping);
        let mut buffer = MirrorBuffer::create(mapping);
        buffer.write(values)?;
        Ok(Self {
            slice: buffer.objects_slice(),
            buffer,
        })
    }

    #[inline]
    pub fn objects_slice(&self) -> Slice {
        self.slice
    }

    #[inline]
    pub fn buffer(&self) -> &MirrorBuffer<f32> {
        &self.buffer
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        self.buffer.as_slice()
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f32] {
        self.buffer.as_mut_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Values for `slice`.
    pub fn slice_view(&self, slice: Slice) -> Result<&[f32], TrainError> {
        self.buffer.slice_view(slice)
    }

    pub fn slice_view_mut(&mut self, slice: Slice) -> Result<&mut [f32], TrainError> {
        self.buffer.slice_view_mut(slice)
    }

    /// Overwrite the values with `other`'s, keeping this cursor's mapping.
    pub fn copy_from(&mut self, other: &Cursor) -> Result<(), TrainError> {
        ensure_invariant!(
            self.slice == other.slice,
            "cursor {} cannot be copied into cursor {}",
            other.slice,
            self.slice
        );
        self.buffer.copy_from(&other.buffer)
    }
}
