use parking_lot::Mutex;

use crate::{DescriptorRange, GfxError, GfxResult};

#[derive(Debug, Clone, Copy)]
pub struct DescriptorHeapDef {
    /// Total descriptors across all frame partitions.
    pub max_descriptors: u32,
}

impl Default for DescriptorHeapDef {
    fn default() -> Self {
        Self {
            max_descriptors: 32 * 1024,
        }
    }
}

/// Transient descriptor heap, partitioned by frame slot.
///
/// Each in-flight frame slot owns an equal partition and allocations are a
/// bump of the partition cursor; nothing is freed individually. The
/// orchestrator resets a partition at `begin_frame`, after the frame
/// throttle has proven the GPU done with the previous frame in that slot.
pub(crate) struct DescriptorHeap {
    partition_size: u32,
    cursors: Vec<Mutex<u32>>,
}

impl DescriptorHeap {
    pub(crate) fn new(definition: &DescriptorHeapDef, render_frame_capacity: u64) -> Self {
        let partition_size = definition.max_descriptors / render_frame_capacity as u32;
        Self {
            partition_size,
            cursors: (0..render_frame_capacity)
                .map(|_| Mutex::new(0))
                .collect(),
        }
    }

    pub(crate) fn partition_size(&self) -> u32 {
        self.partition_size
    }

    /// Bumps `partition`'s cursor by `count` descriptors.
    pub(crate) fn allocate_range(&self, partition: u64, count: u32) -> GfxResult<DescriptorRange> {
        let mut cursor = self.cursors[partition as usize].lock();
        let end = cursor
            .checked_add(count)
            .filter(|end| *end <= self.partition_size)
            .ok_or(GfxError::PoolExhausted {
                kind: "transient descriptor",
                capacity: self.partition_size as usize,
            })?;
        let first = *cursor;
        *cursor = end;
        Ok(DescriptorRange { first, count })
    }

    /// Reclaims the whole partition in one step. Valid only once the GPU
    /// has retired the frame that last wrote it.
    pub(crate) fn reset_partition(&self, partition: u64) {
        *self.cursors[partition as usize].lock() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_contiguous_within_a_partition() {
        let heap = DescriptorHeap::new(&DescriptorHeapDef { max_descriptors: 64 }, 2);
        assert_eq!(heap.partition_size(), 32);

        let a = heap.allocate_range(0, 10).unwrap();
        let b = heap.allocate_range(0, 5).unwrap();
        assert_eq!(a.first, 0);
        assert_eq!(b.first, 10);

        // Partitions bump independently.
        let c = heap.allocate_range(1, 4).unwrap();
        assert_eq!(c.first, 0);
    }

    #[test]
    fn overflowing_a_partition_fails_without_corruption() {
        let heap = DescriptorHeap::new(&DescriptorHeapDef { max_descriptors: 32 }, 2);

        heap.allocate_range(0, 12).unwrap();
        let overflow = heap.allocate_range(0, 8);
        assert!(matches!(
            overflow,
            Err(GfxError::PoolExhausted {
                kind: "transient descriptor",
                ..
            })
        ));

        // A fitting request still succeeds after the failed one.
        let rest = heap.allocate_range(0, 4).unwrap();
        assert_eq!(rest.first, 12);
    }

    #[test]
    fn oversized_request_fails_instead_of_wrapping() {
        let heap = DescriptorHeap::new(&DescriptorHeapDef { max_descriptors: 32 }, 2);
        heap.allocate_range(0, 8).unwrap();

        // Would wrap the cursor arithmetic if unchecked.
        assert!(matches!(
            heap.allocate_range(0, u32::MAX),
            Err(GfxError::PoolExhausted { .. })
        ));

        let rest = heap.allocate_range(0, 8).unwrap();
        assert_eq!(rest.first, 8);
    }

    #[test]
    fn reset_reclaims_the_partition() {
        let heap = DescriptorHeap::new(&DescriptorHeapDef { max_descriptors: 32 }, 2);
        heap.allocate_range(0, 16).unwrap();
        assert!(heap.allocate_range(0, 1).is_err());

        heap.reset_partition(0);
        let range = heap.allocate_range(0, 16).unwrap();
        assert_eq!(range.first, 0);
    }
}
