use std::any::Any;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

/// One pending release: either a deferred-ref-counted object whose final
/// `Arc` is parked until the bucket retires, or an arbitrary release
/// closure (pool-slot reclamation and the like).
pub(crate) enum DeferredItem {
    Object(Box<dyn Any + Send>),
    Callback(Box<dyn FnOnce() + Send>),
}

impl DeferredItem {
    fn release(self) {
        match self {
            Self::Object(object) => drop(object),
            Self::Callback(callback) => callback(),
        }
    }
}

/// Deferred-release smart pointer.
///
/// Behaves like an `Arc<T>` while alive; every dropped clone is routed
/// into the deferred-release queue instead of decrementing the count
/// inline, so the inner value is destroyed no earlier than the retirement
/// of the frame slot that was active when the last clone went away.
pub struct Drc<T: Send + Sync + 'static> {
    inner: ManuallyDrop<Arc<T>>,
    tx: Sender<DeferredItem>,
}

impl<T: Send + Sync + 'static> Deref for Drc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Send + Sync + 'static> Clone for Drc<T> {
    fn clone(&self) -> Self {
        Self {
            inner: ManuallyDrop::new(Arc::clone(&self.inner)),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Drc<T> {
    fn drop(&mut self) {
        // Safety: `inner` is taken exactly once, here.
        let arc = unsafe { ManuallyDrop::take(&mut self.inner) };
        // If the device is already gone the receiver is closed; releasing
        // inline is correct then, since destruction proved the GPU idle.
        if let Err(send_error) = self.tx.send(DeferredItem::Object(Box::new(arc))) {
            drop(send_error.into_inner());
        }
    }
}

struct DropperInner {
    buckets: Vec<Vec<DeferredItem>>,
    /// Slot of the frame currently being recorded; freshly deferred items
    /// are filed here.
    current: u64,
}

/// Deferred release queue: one bucket per in-flight frame slot.
///
/// Dropped `Drc`s and deferred callbacks are fed through a channel (any
/// thread may drop) and filed into the active bucket by the next `flush`,
/// which is called once per frame from the orchestrator, after the frame
/// throttle has proven the GPU done with the slot being reused.
pub(crate) struct DeferredDropper {
    tx: Sender<DeferredItem>,
    rx: Receiver<DeferredItem>,
    inner: Mutex<DropperInner>,
    executed: AtomicU64,
}

impl DeferredDropper {
    pub(crate) fn new(render_frame_capacity: u64) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            inner: Mutex::new(DropperInner {
                buckets: (0..render_frame_capacity).map(|_| Vec::new()).collect(),
                current: 0,
            }),
            executed: AtomicU64::new(0),
        }
    }

    pub(crate) fn new_drc<T: Send + Sync + 'static>(&self, inner: T) -> Drc<T> {
        Drc {
            inner: ManuallyDrop::new(Arc::new(inner)),
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn defer(&self, callback: impl FnOnce() + Send + 'static) {
        // The channel outlives every caller holding a device reference.
        self.tx
            .send(DeferredItem::Callback(Box::new(callback)))
            .ok();
    }

    /// Ends `frame_index` and retires the bucket of the slot about to be
    /// reused. Everything deferred since the previous flush belongs to
    /// `frame_index` and is filed under it first.
    pub(crate) fn flush(&self, frame_index: u64) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(inner.current, frame_index);

        while let Ok(item) = self.rx.try_recv() {
            let current = inner.current as usize;
            inner.buckets[current].push(item);
        }

        let next = (frame_index + 1) % inner.buckets.len() as u64;
        let retired: Vec<_> = inner.buckets[next as usize].drain(..).collect();
        inner.current = next;
        drop(inner);

        self.executed
            .fetch_add(retired.len() as u64, Ordering::Relaxed);
        for item in retired {
            item.release();
        }
    }

    /// Shutdown path: releases every bucket unconditionally. The caller
    /// must have performed a device-wide idle wait first; in-flight GPU
    /// work is not otherwise trusted to have completed.
    pub(crate) fn destroy(&self) {
        loop {
            let mut pending: Vec<DeferredItem> = self.rx.try_iter().collect();
            {
                let mut inner = self.inner.lock();
                for bucket in &mut inner.buckets {
                    pending.append(bucket);
                }
            }
            if pending.is_empty() {
                break;
            }
            self.executed
                .fetch_add(pending.len() as u64, Ordering::Relaxed);
            // Releasing these may send follow-up items (a released pool
            // slot drops its payload), hence the loop.
            for item in pending {
                item.release();
            }
        }
    }

    pub(crate) fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}
