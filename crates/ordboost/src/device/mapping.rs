//! Distribution of a buffer's elements across compute devices.

use std::ops::Range;

/// Declared distribution of a [`DeviceBuffer`](super::DeviceBuffer).
///
/// ```text
/// Mirror  (size 6, 2 devices):  dev0 [0..6)  dev1 [0..6)   (replicas)
/// Stripe  (size 6, 2 devices):  dev0 [0..3)  dev1 [3..6)   (disjoint parts)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// Every device holds a full replica of `size` elements.
    Mirror { size: usize, devices: u32 },
    /// Device `d` owns `[offsets[d], offsets[d + 1])`.
    Stripe { offsets: Vec<usize> },
}

impl Mapping {
    pub fn mirror(size: usize, devices: u32) -> Self {
        Mapping::Mirror { size, devices: devices.max(1) }
    }

    /// Split `size` elements into `devices` contiguous parts of near-equal size.
    pub fn stripe(size: usize, devices: u32) -> Self {
        let devices = devices.max(1) as usize;
        let base = size / devices;
        let extra = size % devices;
        let mut offsets = Vec::with_capacity(devices + 1);
        offsets.push(0);
        for d in 0..devices {
            let part = base + usize::from(d < extra);
            offsets.push(offsets[d] + part);
        }
        Mapping::Stripe { offsets }
    }

    /// Stripe where every device owns an independent block of `per_device` elements.
    pub fn repeat_on_all_devices(per_device: usize, devices: u32) -> Self {
        let offsets = (0..=devices.max(1) as usize).map(|d| d * per_device).collect();
        Mapping::Stripe { offsets }
    }

    /// Total number of elements stored in the host view.
    pub fn size(&self) -> usize {
        match self {
            Mapping::Mirror { size, .. } => *size,
            Mapping::Stripe { offsets } => offsets.last().copied().unwrap_or(0),
        }
    }

    pub fn device_count(&self) -> u32 {
        match self {
            Mapping::Mirror { devices, .. } => *devices,
            Mapping::Stripe { offsets } => offsets.len().saturating_sub(1) as u32,
        }
    }

    /// Disjoint host ranges, one per device part. A mirror has one part.
    pub fn parts(&self) -> Vec<Range<usize>> {
        match self {
            Mapping::Mirror { size, .. } => vec![0..*size],
            Mapping::Stripe { offsets } => offsets.windows(2).map(|w| w[0]..w[1]).collect(),
        }
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self, Mapping::Mirror { .. })
    }
}
