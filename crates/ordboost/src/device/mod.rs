//! Partitioned buffers and their executor.
//!
//! Buffers are host-resident arrays carrying an explicit [`Mapping`] over a
//! configurable number of compute devices. The [`DeviceExecutor`] runs one
//! closure per device part as a batch and joins at the end of the batch,
//! which is the only synchronization point between phases.

mod buffer;
mod executor;
mod mapping;
mod profiler;

pub use buffer::{DeviceBuffer, MirrorBuffer, StripeBuffer};
pub use executor::DeviceExecutor;
pub use mapping::Mapping;
pub use profiler::{PhaseStats, ProfileGuard, Profiler};

/// Gather `src[indices[i]]` into `dst[i]`.
pub fn gather<T: Copy>(dst: &mut [T], src: &[T], indices: &[u32]) {
    debug_assert_eq!(dst.len(), indices.len());
    for (d, &idx) in dst.iter_mut().zip(indices) {
        *d = src[idx as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather() {
        let src = [10.0f32, 20.0, 30.0];
        let mut gathered = [0.0; 3];
        gather(&mut gathered, &src, &[2, 0, 1]);
        assert_eq!(gathered, [30.0, 10.0, 20.0]);
    }
}
