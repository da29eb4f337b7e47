//! Execution of per-device work batches.

use rayon::prelude::*;

use crate::utils::Parallelism;

use super::{Mapping, Profiler};

/// Simulated multi-device executor.
///
/// Every call to [`run_on_devices`](Self::run_on_devices) is one batch: the
/// closures run concurrently (one per device part) and the call returns once
/// all of them finished. The returned results keep device order.
#[derive(Debug)]
pub struct DeviceExecutor {
    device_count: u32,
    parallelism: Parallelism,
    profiler: Profiler,
}

impl DeviceExecutor {
    pub fn new(device_count: u32, parallelism: Parallelism) -> Self {
        Self {
            device_count: device_count.max(1),
            parallelism,
            profiler: Profiler::new(),
        }
    }

    /// Single device, sequential execution.
    pub fn single() -> Self {
        Self::new(1, Parallelism::Sequential)
    }

    #[inline]
    pub fn device_count(&self) -> u32 {
        self.device_count
    }

    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    #[inline]
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Stripe `size` elements over all devices.
    pub fn stripe(&self, size: usize) -> Mapping {
        Mapping::stripe(size, self.device_count)
    }

    /// Replicate `size` elements on all devices.
    pub fn mirror(&self, size: usize) -> Mapping {
        Mapping::mirror(size, self.device_count)
    }

    /// Run `f(device, work)` for every item and wait for the whole batch.
    pub fn run_on_devices<W, R, F>(&self, work: Vec<W>, f: F) -> Vec<R>
    where
        W: Send,
        R: Send,
        F: Fn(u32, W) -> R + Sync + Send,
    {
        let indexed: Vec<(u32, W)> = work
            .into_iter()
            .enumerate()
            .map(|(device, item)| (device as u32, item))
            .collect();
        self.parallelism
            .maybe_par_map(indexed, |(device, item)| f(device, item))
    }

    /// Run independent tasks of a batch. Unlike [`run_on_devices`](Self::run_on_devices)
    /// the work items are not tied to devices.
    pub fn run_batch<W, R, F>(&self, work: Vec<W>, f: F) -> Vec<R>
    where
        W: Send,
        R: Send,
        F: Fn(W) -> R + Sync + Send,
    {
        if self.parallelism.is_parallel() {
            work.into_par_iter().map(f).collect()
        } else {
            work.into_iter().map(f).collect()
        }
    }
}

impl Default for DeviceExecutor {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceBuffer;

    #[test]
    fn test_run_on_devices_keeps_order() {
        let executor = DeviceExecutor::new(3, Parallelism::Parallel);
        let buffer = DeviceBuffer::<u32>::from_vec(executor.stripe(6), (0..6).collect()).unwrap();
        let sums = executor.run_on_devices(buffer.parts(), |_, part| part.iter().sum::<u32>());
        assert_eq!(sums, vec![1, 5, 9]);
    }

    #[test]
    fn test_run_on_devices_mutates_parts() {
        let executor = DeviceExecutor::new(2, Parallelism::Sequential);
        let mut buffer = DeviceBuffer::<u32>::create(executor.stripe(4));
        executor.run_on_devices(buffer.parts_mut(), |device, part| part.fill(device * 10));
        assert_eq!(buffer.as_slice(), &[0, 0, 10, 10]);
    }
}
