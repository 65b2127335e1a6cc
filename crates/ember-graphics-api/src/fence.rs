use std::sync::atomic::{AtomicU64, Ordering};

use crate::backends::{BackendDeviceContext, BackendFence};
use crate::GfxResult;

/// CPU/GPU synchronization point over a monotonically increasing counter.
///
/// One fence object is reused across its device's lifetime: the CPU side
/// reserves strictly increasing values with [`Fence::next_value`] when it
/// schedules a signal through a queue, and the completed side only
/// advances when the GPU timeline actually executes that signal.
/// `completed <= submitted` always holds.
pub struct Fence {
    submitted: AtomicU64,
    pub(crate) backend_fence: BackendFence,
}

impl Fence {
    pub(crate) fn new(backend_device_context: &BackendDeviceContext) -> Self {
        Self {
            submitted: AtomicU64::new(0),
            backend_fence: BackendFence::new(backend_device_context),
        }
    }

    /// Reserves the next value to signal. Called by queues when the signal
    /// op is enqueued, which keeps the submitted counter monotonic per
    /// fence regardless of which queue signals it.
    pub(crate) fn next_value(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Highest value a signal has been scheduled for.
    pub fn submitted_value(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Last observed completed value. Never blocks, never exceeds
    /// `submitted_value`.
    pub fn poll(&self) -> u64 {
        self.backend_fence.completed_value()
    }

    /// Blocks the calling thread until the completed value reaches
    /// `value`. No-op when already satisfied.
    pub fn wait(&self, value: u64) -> GfxResult<()> {
        if self.poll() >= value {
            return Ok(());
        }
        self.backend_fence.wait(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::{GpuOp, SoftwareDeviceContext};
    use crate::ApiDef;

    fn test_fence() -> (SoftwareDeviceContext, Fence) {
        let (context, _info) = SoftwareDeviceContext::new(&ApiDef::default()).unwrap();
        let fence = Fence::new(&context);
        (context, fence)
    }

    #[test]
    fn poll_is_monotonic_and_bounded_by_highest_signal() {
        let (context, fence) = test_fence();

        let mut last = 0;
        for value in [1_u64, 2, 5, 9] {
            context
                .timeline()
                .push(GpuOp::Signal {
                    completion: fence.backend_fence.completion(),
                    value,
                })
                .unwrap();
            fence.wait(value).unwrap();
            let polled = fence.poll();
            assert!(polled >= last);
            assert!(polled <= 9);
            last = polled;
        }
        assert_eq!(fence.poll(), 9);
    }

    #[test]
    fn wait_returns_only_once_value_reached() {
        let (context, fence) = test_fence();

        context
            .timeline()
            .push(GpuOp::Signal {
                completion: fence.backend_fence.completion(),
                value: 1,
            })
            .unwrap();
        context
            .timeline()
            .push(GpuOp::Signal {
                completion: fence.backend_fence.completion(),
                value: 2,
            })
            .unwrap();

        assert_eq!(fence.poll(), 0);
        fence.wait(1).unwrap();
        assert!(fence.poll() >= 1);
        fence.wait(2).unwrap();
        assert_eq!(fence.poll(), 2);
        // Already satisfied: returns immediately.
        fence.wait(1).unwrap();
        fence.wait(2).unwrap();
    }
}
