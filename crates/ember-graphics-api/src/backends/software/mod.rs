//! Software reference backend.
//!
//! Implements the backend contract on a simulated GPU timeline
//! ([`GpuTimeline`]) so the frame-lifecycle machinery runs, and can be
//! tested, without any native API. Native objects are table entries with
//! a memory ledger standing in for device memory.

pub(crate) mod timeline;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use fnv::FnvHashMap;
use log::{trace, warn};
use parking_lot::Mutex;

use crate::{
    AdapterType, ApiDef, BufferDef, DeviceInfo, GfxError, GfxResult, MemoryUsage, PresentResult,
    QueueType, SwapchainDef, TextureDef,
};

pub(crate) use timeline::{FenceCompletion, GpuOp, GpuTimeline};

/// Size charged against the memory ledger for one command allocator.
const COMMAND_ALLOCATOR_SIZE: u64 = 64 * 1024;

struct LiveObject {
    kind: &'static str,
    name: String,
}

struct MemoryLedger {
    budget: u64,
    used: Mutex<u64>,
}

impl MemoryLedger {
    fn charge(&self, size: u64, what: &str) -> GfxResult<()> {
        let mut used = self.used.lock();
        if *used + size > self.budget {
            return Err(GfxError::OutOfMemory(format!(
                "{} of {} bytes exceeds budget ({} of {} in use)",
                what, size, *used, self.budget
            )));
        }
        *used += size;
        Ok(())
    }

    fn release(&self, size: u64) {
        let mut used = self.used.lock();
        debug_assert!(*used >= size);
        *used -= size;
    }
}

struct SoftwareDeviceContextInner {
    device_info: DeviceInfo,
    timeline: GpuTimeline,
    memory: MemoryLedger,
    next_object_id: AtomicU64,
    live_objects: Mutex<FnvHashMap<u64, LiveObject>>,
}

#[derive(Clone)]
pub(crate) struct SoftwareDeviceContext {
    inner: Arc<SoftwareDeviceContextInner>,
}

impl SoftwareDeviceContext {
    pub(crate) fn new(api_def: &ApiDef) -> GfxResult<(Self, DeviceInfo)> {
        let device_info = DeviceInfo {
            adapter_name: "Ember Software Adapter".to_string(),
            adapter_type: AdapterType::Cpu,
            supports_multithreaded_usage: true,
            min_uniform_buffer_offset_alignment: 256,
            upload_buffer_texture_alignment: 512,
        };

        let inner = Self {
            inner: Arc::new(SoftwareDeviceContextInner {
                device_info: device_info.clone(),
                timeline: GpuTimeline::new(),
                memory: MemoryLedger {
                    budget: api_def.memory_budget.unwrap_or(u64::MAX),
                    used: Mutex::new(0),
                },
                next_object_id: AtomicU64::new(1),
                live_objects: Mutex::new(FnvHashMap::default()),
            }),
        };

        Ok((inner, device_info))
    }

    pub(crate) fn timeline(&self) -> &GpuTimeline {
        &self.inner.timeline
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.inner.timeline.is_lost()
    }

    pub(crate) fn inject_device_loss(&self) {
        self.inner.timeline.inject_device_loss();
    }

    /// Tear-down check, invoked once the frontend has proven the GPU idle
    /// and released every pool. Anything still registered leaked.
    pub(crate) fn destroy(&self) {
        self.inner.timeline.drain();
        let live = self.inner.live_objects.lock();
        for object in live.values() {
            warn!(
                "native {} \"{}\" leaked at device destruction",
                object.kind, object.name
            );
        }
        trace!(
            "software device destroyed, {} commands executed",
            self.inner.timeline.executed_command_count()
        );
    }

    fn register(&self, kind: &'static str, name: &str) -> u64 {
        let id = self.inner.next_object_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live_objects.lock().insert(
            id,
            LiveObject {
                kind,
                name: name.to_string(),
            },
        );
        id
    }

    fn unregister(&self, id: u64) {
        self.inner.live_objects.lock().remove(&id);
    }

    pub(crate) fn create_buffer(
        &self,
        buffer_def: &BufferDef,
        name: &str,
    ) -> GfxResult<SoftwareBuffer> {
        self.inner.memory.charge(buffer_def.size, "buffer")?;
        let storage = match buffer_def.memory_usage {
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => {
                Some(Mutex::new(vec![0_u8; buffer_def.size as usize]))
            }
            MemoryUsage::GpuOnly => None,
        };
        Ok(SoftwareBuffer {
            device_context: self.clone(),
            id: self.register("buffer", name),
            size: buffer_def.size,
            storage,
        })
    }

    pub(crate) fn create_texture(
        &self,
        texture_def: &TextureDef,
        name: &str,
    ) -> GfxResult<SoftwareTexture> {
        let size = texture_def.byte_size();
        self.inner.memory.charge(size, "texture")?;
        Ok(SoftwareTexture {
            device_context: self.clone(),
            id: self.register("texture", name),
            size,
        })
    }

    pub(crate) fn create_command_allocator(
        &self,
        name: &str,
    ) -> GfxResult<SoftwareCommandAllocator> {
        self.inner
            .memory
            .charge(COMMAND_ALLOCATOR_SIZE, "command allocator")?;
        Ok(SoftwareCommandAllocator {
            device_context: self.clone(),
            id: self.register("command allocator", name),
            reset_count: 0,
        })
    }
}

pub(crate) struct SoftwareBuffer {
    device_context: SoftwareDeviceContext,
    id: u64,
    size: u64,
    storage: Option<Mutex<Vec<u8>>>,
}

impl SoftwareBuffer {
    pub(crate) fn native_id(&self) -> u64 {
        self.id
    }

    pub(crate) fn write(&self, byte_offset: u64, data: &[u8]) -> GfxResult<()> {
        let storage = self.storage.as_ref().ok_or_else(|| {
            GfxError::ValidationFailure("writing to a non-mapped buffer".to_string())
        })?;
        let mut bytes = storage.lock();
        let start = byte_offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(GfxError::ValidationFailure(format!(
                "write of {} bytes at offset {} past buffer size {}",
                data.len(),
                byte_offset,
                self.size
            )));
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn destroy(&self) {
        self.device_context.inner.memory.release(self.size);
        self.device_context.unregister(self.id);
    }
}

pub(crate) struct SoftwareTexture {
    device_context: SoftwareDeviceContext,
    id: u64,
    size: u64,
}

impl SoftwareTexture {
    pub(crate) fn native_id(&self) -> u64 {
        self.id
    }

    pub(crate) fn destroy(&self) {
        self.device_context.inner.memory.release(self.size);
        self.device_context.unregister(self.id);
    }
}

pub(crate) struct SoftwareCommandAllocator {
    device_context: SoftwareDeviceContext,
    id: u64,
    reset_count: u64,
}

impl SoftwareCommandAllocator {
    pub(crate) fn native_id(&self) -> u64 {
        self.id
    }

    pub(crate) fn reset(&mut self) {
        self.reset_count += 1;
    }

    pub(crate) fn reset_count(&self) -> u64 {
        self.reset_count
    }

    pub(crate) fn destroy(&self) {
        self.device_context
            .inner
            .memory
            .release(COMMAND_ALLOCATOR_SIZE);
        self.device_context.unregister(self.id);
    }
}

pub(crate) struct SoftwareQueue {
    device_context: SoftwareDeviceContext,
    #[allow(dead_code)]
    queue_type: QueueType,
}

impl SoftwareQueue {
    pub(crate) fn new(device_context: &SoftwareDeviceContext, queue_type: QueueType) -> Self {
        Self {
            device_context: device_context.clone(),
            queue_type,
        }
    }

    pub(crate) fn submit(&self, command_count: u64) -> GfxResult<()> {
        self.device_context
            .timeline()
            .push(GpuOp::Execute { command_count })
    }

    pub(crate) fn signal(&self, completion: Arc<FenceCompletion>, value: u64) -> GfxResult<()> {
        self.device_context
            .timeline()
            .push(GpuOp::Signal { completion, value })
    }

    pub(crate) fn present(&self, swapchain: &SoftwareSwapchain) -> GfxResult<PresentResult> {
        if self.device_context.is_lost() {
            return Err(GfxError::DeviceLost);
        }
        Ok(if swapchain.matches_window() {
            PresentResult::Success
        } else {
            PresentResult::Suboptimal
        })
    }
}

pub(crate) struct SoftwareFence {
    device_context: SoftwareDeviceContext,
    completion: Arc<FenceCompletion>,
}

impl SoftwareFence {
    pub(crate) fn new(device_context: &SoftwareDeviceContext) -> Self {
        Self {
            device_context: device_context.clone(),
            completion: Arc::new(FenceCompletion::new()),
        }
    }

    pub(crate) fn completion(&self) -> Arc<FenceCompletion> {
        Arc::clone(&self.completion)
    }

    pub(crate) fn completed_value(&self) -> u64 {
        self.completion.value()
    }

    pub(crate) fn wait(&self, value: u64) -> GfxResult<()> {
        self.device_context
            .timeline()
            .wait(&self.completion, value)
    }
}

pub(crate) struct SoftwareSwapchain {
    image_count: u32,
    next_image: AtomicU32,
    extent: (u32, u32),
    window_extent: Mutex<(u32, u32)>,
}

impl SoftwareSwapchain {
    pub(crate) fn new(
        _device_context: &SoftwareDeviceContext,
        swapchain_def: &SwapchainDef,
        image_count: u32,
    ) -> GfxResult<Self> {
        Ok(Self {
            image_count,
            next_image: AtomicU32::new(0),
            extent: (swapchain_def.width, swapchain_def.height),
            window_extent: Mutex::new((swapchain_def.width, swapchain_def.height)),
        })
    }

    pub(crate) fn image_count(&self) -> u32 {
        self.image_count
    }

    pub(crate) fn acquire_next_image(&self) -> u32 {
        self.next_image.fetch_add(1, Ordering::Relaxed) % self.image_count
    }

    pub(crate) fn set_window_extent(&self, width: u32, height: u32) {
        *self.window_extent.lock() = (width, height);
    }

    pub(crate) fn rebuild(&mut self, swapchain_def: &SwapchainDef) {
        self.extent = (swapchain_def.width, swapchain_def.height);
        self.next_image.store(0, Ordering::Relaxed);
    }

    fn matches_window(&self) -> bool {
        *self.window_extent.lock() == self.extent
    }
}

pub(crate) mod backend_impl {
    pub(crate) type BackendDeviceContext = super::SoftwareDeviceContext;
    pub(crate) type BackendBuffer = super::SoftwareBuffer;
    pub(crate) type BackendTexture = super::SoftwareTexture;
    pub(crate) type BackendCommandAllocator = super::SoftwareCommandAllocator;
    pub(crate) type BackendQueue = super::SoftwareQueue;
    pub(crate) type BackendFence = super::SoftwareFence;
    pub(crate) type BackendSwapchain = super::SoftwareSwapchain;
}
