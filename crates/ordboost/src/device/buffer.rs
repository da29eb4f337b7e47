//! Typed partitioned buffers.
//!
//! A [`DeviceBuffer`] is a host-backed array with a declared [`Mapping`]. All
//! per-device work goes through [`DeviceBuffer::parts`] /
//! [`DeviceBuffer::parts_mut`], which hand out one disjoint slice per device
//! part so that parts can be processed concurrently by the
//! [`DeviceExecutor`](super::DeviceExecutor).

use crate::error::{ensure_invariant, TrainError};
use crate::slice::Slice;

use super::Mapping;

/// Partitioned buffer of `T` with an explicit device mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer<T> {
    mapping: Mapping,
    data: Vec<T>,
}

/// Buffer striped across devices.
pub type StripeBuffer<T> = DeviceBuffer<T>;

/// Buffer replicated on every device.
pub type MirrorBuffer<T> = DeviceBuffer<T>;

impl<T: Copy + Default + Send + Sync> DeviceBuffer<T> {
    /// Allocate a buffer filled with `T::default()`.
    pub fn create(mapping: Mapping) -> Self {
        let data = vec![T::default(); mapping.size()];
        Self { mapping, data }
    }

    /// Allocate a buffer with the same mapping as `other`.
    pub fn copy_mapping<U>(other: &DeviceBuffer<U>) -> Self {
        Self::create(other.mapping.clone())
    }

    /// Wrap host data. Fails if `data` does not match the mapping size.
    pub fn from_vec(mapping: Mapping, data: Vec<T>) -> Result<Self, TrainError> {
        ensure_invariant!(
            data.len() == mapping.size(),
            "buffer size {} does not match mapping size {}",
            data.len(),
            mapping.size()
        );
        Ok(Self { mapping, data })
    }

    #[inline]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffer's declared range of objects.
    #[inline]
    pub fn objects_slice(&self) -> Slice {
        Slice::full(self.data.len() as u32)
    }

    /// Overwrite the whole buffer from host memory.
    pub fn write(&mut self, src: &[T]) -> Result<(), TrainError> {
        ensure_invariant!(
            src.len() == self.data.len(),
            "write of {} elements into buffer of {}",
            src.len(),
            self.data.len()
        );
        self.data.copy_from_slice(src);
        Ok(())
    }

    /// Copy contents from a buffer of identical size.
    pub fn copy_from(&mut self, other: &DeviceBuffer<T>) -> Result<(), TrainError> {
        self.write(&other.data)
    }

    /// Read the host view.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Read-only view of `slice`.
    pub fn slice_view(&self, slice: Slice) -> Result<&[T], TrainError> {
        ensure_invariant!(
            slice.right as usize <= self.data.len() && slice.left <= slice.right,
            "slice {} out of buffer of {}",
            slice,
            self.data.len()
        );
        Ok(&self.data[slice.range()])
    }

    /// Mutable view of `slice`.
    pub fn slice_view_mut(&mut self, slice: Slice) -> Result<&mut [T], TrainError> {
        ensure_invariant!(
            slice.right as usize <= self.data.len() && slice.left <= slice.right,
            "slice {} out of buffer of {}",
            slice,
            self.data.len()
        );
        Ok(&mut self.data[slice.range()])
    }

    /// One read-only slice per device part.
    pub fn parts(&self) -> Vec<&[T]> {
        self.mapping
            .parts()
            .into_iter()
            .map(|range| &self.data[range])
            .collect()
    }

    /// One mutable slice per device part. Parts are disjoint.
    pub fn parts_mut(&mut self) -> Vec<&mut [T]> {
        let ranges = self.mapping.parts();
        let mut parts = Vec::with_capacity(ranges.len());
        let mut rest: &mut [T] = &mut self.data;
        let mut consumed = 0;
        for range in ranges {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(range.start - consumed);
            let (part, tail) = tail.split_at_mut(range.len());
            parts.push(part);
            rest = tail;
            consumed = range.end;
        }
        parts
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}
