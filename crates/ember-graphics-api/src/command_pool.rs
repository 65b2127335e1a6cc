use std::collections::VecDeque;

use log::warn;
use parking_lot::Mutex;

use crate::backends::{BackendCommandAllocator, BackendDeviceContext};
use crate::{GfxResult, QueueType};

/// Native object backing the memory of recorded GPU commands. Must not be
/// reset while the GPU may still be executing commands recorded into it;
/// the pool below enforces that through fence values.
pub struct CommandAllocator {
    name: String,
    pub(crate) backend_command_allocator: BackendCommandAllocator,
}

impl CommandAllocator {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_id(&self) -> u64 {
        self.backend_command_allocator.native_id()
    }

    /// Times the allocator has been reset for reuse.
    pub fn reset_count(&self) -> u64 {
        self.backend_command_allocator.reset_count()
    }

    pub(crate) fn reset(&mut self) {
        self.backend_command_allocator.reset();
    }
}

impl Drop for CommandAllocator {
    fn drop(&mut self) {
        // An allocator is only dropped once nothing references it: the
        // pool holds discarded ones, so a drop means checked-out-and-
        // abandoned (or pool tear-down), and the native object goes with
        // it either way.
        self.backend_command_allocator.destroy();
    }
}

struct CommandAllocatorPoolInner {
    /// FIFO of discarded allocators tagged with the fence value that must
    /// complete before each becomes reusable. FIFO order equals fence
    /// order because allocators are discarded in submission order; that is
    /// a constraint on callers, checked below.
    ready: VecDeque<(u64, CommandAllocator)>,
    last_discard_fence: u64,
    created_count: u64,
    reused_count: u64,
}

/// Reusable pool of command allocators, gated by fence proof.
///
/// Growth is unbounded by design: the number of simultaneously in-flight
/// allocators is bounded by the frame latency, not by a hard cap.
pub struct CommandAllocatorPool {
    queue_type: QueueType,
    inner: Mutex<CommandAllocatorPoolInner>,
}

impl CommandAllocatorPool {
    pub(crate) fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            inner: Mutex::new(CommandAllocatorPoolInner {
                ready: VecDeque::new(),
                last_discard_fence: 0,
                created_count: 0,
                reused_count: 0,
            }),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Returns an allocator safe to record into. The head of the ready
    /// queue is reset and reused iff the GPU has retired the frame it was
    /// last submitted in (`ready_at <= completed_fence_value`); otherwise
    /// a new allocator is created.
    pub(crate) fn request(
        &self,
        device_context: &BackendDeviceContext,
        completed_fence_value: u64,
    ) -> GfxResult<CommandAllocator> {
        let mut inner = self.inner.lock();

        let head_ready = matches!(
            inner.ready.front(),
            Some((ready_at, _)) if *ready_at <= completed_fence_value
        );
        if head_ready {
            if let Some((_, mut allocator)) = inner.ready.pop_front() {
                allocator.reset();
                inner.reused_count += 1;
                return Ok(allocator);
            }
        }

        let name = format!("CommandAllocator {}", inner.created_count);
        let backend_command_allocator = device_context.create_command_allocator(&name)?;
        inner.created_count += 1;

        Ok(CommandAllocator {
            name,
            backend_command_allocator,
        })
    }

    /// Returns `allocator` to the ready queue, reusable once the fence
    /// reaches `fence_value` (the value signaled by the submission that
    /// last used it).
    pub(crate) fn discard(&self, fence_value: u64, allocator: CommandAllocator) {
        let mut inner = self.inner.lock();
        if fence_value < inner.last_discard_fence {
            // Out-of-submission-order discard breaks the FIFO==fence-order
            // equivalence the reuse check relies on.
            warn!(
                "command allocator {} discarded out of submission order ({} after {})",
                allocator.name(),
                fence_value,
                inner.last_discard_fence
            );
        }
        inner.last_discard_fence = inner.last_discard_fence.max(fence_value);
        inner.ready.push_back((fence_value, allocator));
    }

    pub(crate) fn created_count(&self) -> u64 {
        self.inner.lock().created_count
    }

    pub(crate) fn reused_count(&self) -> u64 {
        self.inner.lock().reused_count
    }

    /// Device-shutdown path; the caller has proven the GPU idle. Pooled
    /// allocators destroy their backend objects as they drop.
    pub(crate) fn destroy(&self) {
        self.inner.lock().ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::SoftwareDeviceContext;
    use crate::ApiDef;

    fn test_pool() -> (SoftwareDeviceContext, CommandAllocatorPool) {
        let (context, _info) = SoftwareDeviceContext::new(&ApiDef::default()).unwrap();
        (context, CommandAllocatorPool::new(QueueType::Graphics))
    }

    #[test]
    fn discarded_allocator_not_reused_before_fence_completes() {
        let (context, pool) = test_pool();

        let first = pool.request(&context, 0).unwrap();
        let first_id = first.native_id();
        pool.discard(5, first);

        // Fence at 4: the head is not ready, a new allocator grows the
        // pool.
        let second = pool.request(&context, 4).unwrap();
        assert_ne!(second.native_id(), first_id);
        assert_eq!(pool.created_count(), 2);

        // Fence at 5: the discarded allocator is the next one returned,
        // reset for reuse.
        pool.discard(6, second);
        let reused = pool.request(&context, 5).unwrap();
        assert_eq!(reused.native_id(), first_id);
        assert_eq!(reused.reset_count(), 1);
        assert_eq!(pool.reused_count(), 1);

        pool.discard(7, reused);
        pool.destroy();
    }

    #[test]
    fn reuse_is_fifo_by_discard_order() {
        let (context, pool) = test_pool();

        let a = pool.request(&context, 0).unwrap();
        let b = pool.request(&context, 0).unwrap();
        let (id_a, id_b) = (a.native_id(), b.native_id());
        pool.discard(1, a);
        pool.discard(2, b);

        let first = pool.request(&context, 10).unwrap();
        let second = pool.request(&context, 10).unwrap();
        assert_eq!(first.native_id(), id_a);
        assert_eq!(second.native_id(), id_b);

        pool.discard(11, first);
        pool.discard(12, second);
        pool.destroy();
    }

    #[test]
    fn dropped_allocators_release_their_backing_memory() {
        // Budget for exactly two 64 KiB allocators.
        let (context, _info) = SoftwareDeviceContext::new(&ApiDef {
            memory_budget: Some(128 * 1024),
            ..ApiDef::default()
        })
        .unwrap();
        let pool = CommandAllocatorPool::new(QueueType::Graphics);

        // Checked out and abandoned without a discard, three times over;
        // only possible if dropping returns the memory.
        for _ in 0..3 {
            let a = pool.request(&context, 0).unwrap();
            let b = pool.request(&context, 0).unwrap();
            drop(a);
            drop(b);
        }
    }

    #[test]
    fn growth_is_unbounded_while_fence_lags() {
        let (context, pool) = test_pool();

        for i in 0..8 {
            let allocator = pool.request(&context, 0).unwrap();
            pool.discard(i + 1, allocator);
        }
        // Nothing completed yet, so every request created.
        assert_eq!(pool.created_count(), 8);
        assert_eq!(pool.reused_count(), 0);
        pool.destroy();
    }
}
