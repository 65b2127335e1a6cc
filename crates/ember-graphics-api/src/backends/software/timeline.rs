use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::{GfxError, GfxResult};

/// Completion state of one fence. Only advances when the timeline executes
/// a signal op for it, never by CPU-side assumption.
pub(crate) struct FenceCompletion {
    value: Mutex<u64>,
}

impl FenceCompletion {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(0),
        }
    }

    pub(crate) fn value(&self) -> u64 {
        *self.value.lock()
    }

    fn signal(&self, value: u64) {
        let mut guard = self.value.lock();
        if value > *guard {
            *guard = value;
        }
    }
}

pub(crate) enum GpuOp {
    Execute {
        command_count: u64,
    },
    Signal {
        completion: Arc<FenceCompletion>,
        value: u64,
    },
}

/// Simulated GPU command stream.
///
/// Submissions are queued and retired in order, but only when the CPU
/// yields time to the "GPU" by waiting on a fence. That keeps the timeline
/// fully deterministic: `poll` never observes work the CPU has not
/// explicitly waited out, which is exactly the property the frame
/// throttling and deferred-release layers are built on.
pub(crate) struct GpuTimeline {
    ops_tx: Sender<GpuOp>,
    ops_rx: Receiver<GpuOp>,
    lost: AtomicBool,
    executed_command_count: AtomicU64,
}

impl GpuTimeline {
    pub(crate) fn new() -> Self {
        let (ops_tx, ops_rx) = crossbeam_channel::unbounded();
        Self {
            ops_tx,
            ops_rx,
            lost: AtomicBool::new(false),
            executed_command_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn push(&self, op: GpuOp) -> GfxResult<()> {
        if self.is_lost() {
            return Err(GfxError::DeviceLost);
        }
        self.ops_tx.send(op).map_err(|_| GfxError::DeviceLost)
    }

    /// Retire queued ops until `completion` reaches `value`. Blocks only
    /// the calling thread. A wait for a value that was never scheduled for
    /// signaling spins forever, the same way a hung driver would; callers
    /// detect that through device-lost status, not timeouts.
    pub(crate) fn wait(&self, completion: &FenceCompletion, value: u64) -> GfxResult<()> {
        loop {
            if completion.value() >= value {
                return Ok(());
            }
            if self.is_lost() {
                return Err(GfxError::DeviceLost);
            }
            match self.ops_rx.try_recv() {
                Ok(op) => self.execute(op),
                // Another waiter holds the op that will satisfy us.
                Err(TryRecvError::Empty) => std::thread::yield_now(),
                Err(TryRecvError::Disconnected) => return Err(GfxError::DeviceLost),
            }
        }
    }

    /// Retire everything currently queued.
    pub(crate) fn drain(&self) {
        while let Ok(op) = self.ops_rx.try_recv() {
            self.execute(op);
        }
    }

    fn execute(&self, op: GpuOp) {
        match op {
            GpuOp::Execute { command_count } => {
                self.executed_command_count
                    .fetch_add(command_count, Ordering::Relaxed);
            }
            GpuOp::Signal { completion, value } => completion.signal(value),
        }
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Debug hook simulating a removed/reset device. Everything submitted
    /// afterwards reports `DeviceLost`.
    pub(crate) fn inject_device_loss(&self) {
        self.lost.store(true, Ordering::Release);
    }

    pub(crate) fn executed_command_count(&self) -> u64 {
        self.executed_command_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_ops_retire_in_order_on_wait() {
        let timeline = GpuTimeline::new();
        let completion = Arc::new(FenceCompletion::new());

        for value in 1..=3 {
            timeline
                .push(GpuOp::Signal {
                    completion: Arc::clone(&completion),
                    value,
                })
                .unwrap();
        }

        assert_eq!(completion.value(), 0);
        timeline.wait(&completion, 2).unwrap();
        assert!(completion.value() >= 2);
        timeline.wait(&completion, 3).unwrap();
        assert_eq!(completion.value(), 3);
    }

    #[test]
    fn lost_timeline_rejects_submissions() {
        let timeline = GpuTimeline::new();
        timeline.inject_device_loss();
        assert_eq!(
            timeline.push(GpuOp::Execute { command_count: 1 }),
            Err(GfxError::DeviceLost)
        );
    }
}
