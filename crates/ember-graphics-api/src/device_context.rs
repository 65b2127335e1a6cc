use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, trace, warn};
use parking_lot::Mutex;

use crate::backends::{BackendDeviceContext, BackendQueue};
use crate::command_pool::{CommandAllocator, CommandAllocatorPool};
use crate::deferred_drop::DeferredDropper;
use crate::descriptor_heap::DescriptorHeap;
use crate::{
    AdapterType, ApiDef, Buffer, BufferDef, CommandBuffer, DescriptorRange, Fence, GfxError,
    GfxResult, HandlePool, PresentResult, Queue, QueueType, ResourceHandle, Swapchain,
    SwapchainDef, Texture, TextureDef, MAX_FRAME_LATENCY,
};

/// Static properties of the adapter backing a device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub adapter_name: String,
    pub adapter_type: AdapterType,
    pub supports_multithreaded_usage: bool,
    pub min_uniform_buffer_offset_alignment: u32,
    pub upload_buffer_texture_alignment: u32,
}

/// Point-in-time counters, mostly for tests and debug overlays.
#[derive(Debug, Clone)]
pub struct DeviceStats {
    pub current_cpu_frame: u64,
    pub current_gpu_frame: u64,
    pub frames_submitted: u64,
    /// Presents that had to block because the CPU ran a full
    /// `max_frame_latency` ahead of the GPU.
    pub throttle_waits: u64,
    pub suboptimal_presents: u64,
    pub validation_errors: u64,
    pub deferred_releases_executed: u64,
    pub command_allocators_created: u64,
    pub command_allocators_reused: u64,
    pub live_buffers: usize,
    pub live_textures: usize,
}

struct DeviceMetrics {
    frames_submitted: AtomicU64,
    throttle_waits: AtomicU64,
    suboptimal_presents: AtomicU64,
    validation_errors: AtomicU64,
}

/// Handle-indexed storage for device-owned resources. Kept behind its own
/// `Arc` so deferred slot-reclamation callbacks do not have to keep the
/// whole device alive.
pub(crate) struct GpuResourcePools {
    pub(crate) buffers: Mutex<HandlePool<Buffer>>,
    pub(crate) textures: Mutex<HandlePool<Texture>>,
}

struct FrameState {
    /// Frames the CPU has finished recording (incremented by `present`).
    current_cpu_frame: u64,
    /// Highest frame the GPU is proven to have fully executed.
    current_gpu_frame: u64,
    /// Slot of the frame currently being recorded:
    /// `current_cpu_frame % max_frame_latency`.
    frame_index: u64,
    /// Allocator backing the frame between `begin_frame` and `present`.
    active_allocator: Option<CommandAllocator>,
}

struct DeviceContextInner {
    device_info: DeviceInfo,
    max_frame_latency: u64,
    validation: bool,
    deferred_dropper: DeferredDropper,
    frame_fence: Fence,
    frame: Mutex<FrameState>,
    command_allocator_pool: CommandAllocatorPool,
    descriptor_heap: DescriptorHeap,
    pools: Arc<GpuResourcePools>,
    /// Internal queue the frame lifecycle submits and signals through.
    graphics_queue: BackendQueue,
    metrics: DeviceMetrics,
    lost: AtomicBool,
    backend_device_context: BackendDeviceContext,
}

/// The device and its frame orchestrator.
///
/// Cheap to clone and share across threads. Frame control (`begin_frame`,
/// `present`, `wait_for_idle`) is serialized internally; resource creation
/// and destruction may happen from any thread at any time.
#[derive(Clone)]
pub struct DeviceContext {
    inner: Arc<DeviceContextInner>,
}

impl DeviceContext {
    pub(crate) fn new(api_def: &ApiDef) -> GfxResult<Self> {
        let max_frame_latency = api_def.max_frame_latency.clamp(1, MAX_FRAME_LATENCY);
        if max_frame_latency != api_def.max_frame_latency {
            warn!(
                "max_frame_latency {} out of range, clamped to {}",
                api_def.max_frame_latency, max_frame_latency
            );
        }

        let (backend_device_context, device_info) = BackendDeviceContext::new(api_def)?;
        trace!(
            "device created on \"{}\" (latency {})",
            device_info.adapter_name,
            max_frame_latency
        );

        let frame_fence = Fence::new(&backend_device_context);
        let graphics_queue = BackendQueue::new(&backend_device_context, QueueType::Graphics);

        let descriptor_heap =
            DescriptorHeap::new(&api_def.transient_descriptor_heap_def, max_frame_latency);
        trace!(
            "transient descriptors: {} partitions of {}",
            max_frame_latency,
            descriptor_heap.partition_size()
        );

        Ok(Self {
            inner: Arc::new(DeviceContextInner {
                device_info,
                max_frame_latency,
                validation: api_def.validation,
                deferred_dropper: DeferredDropper::new(max_frame_latency),
                frame_fence,
                frame: Mutex::new(FrameState {
                    current_cpu_frame: 0,
                    current_gpu_frame: 0,
                    frame_index: 0,
                    active_allocator: None,
                }),
                command_allocator_pool: CommandAllocatorPool::new(QueueType::Graphics),
                descriptor_heap,
                pools: Arc::new(GpuResourcePools {
                    buffers: Mutex::new(HandlePool::new("buffer", api_def.buffer_pool_capacity)),
                    textures: Mutex::new(HandlePool::new(
                        "texture",
                        api_def.texture_pool_capacity,
                    )),
                }),
                graphics_queue,
                metrics: DeviceMetrics {
                    frames_submitted: AtomicU64::new(0),
                    throttle_waits: AtomicU64::new(0),
                    suboptimal_presents: AtomicU64::new(0),
                    validation_errors: AtomicU64::new(0),
                },
                lost: AtomicBool::new(false),
                backend_device_context,
            }),
        })
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.inner.device_info
    }

    pub fn max_frame_latency(&self) -> u64 {
        self.inner.max_frame_latency
    }

    pub(crate) fn backend_device_context(&self) -> &BackendDeviceContext {
        &self.inner.backend_device_context
    }

    pub(crate) fn deferred_dropper(&self) -> &DeferredDropper {
        &self.inner.deferred_dropper
    }

    //
    // Frame lifecycle
    //

    /// Opens the next frame and returns the command buffer to record it
    /// into. Fails fast with `DeviceLost` once the device is lost.
    pub fn begin_frame(&self) -> GfxResult<CommandBuffer> {
        if self.is_device_lost() {
            return Err(GfxError::DeviceLost);
        }

        let mut frame = self.inner.frame.lock();
        if frame.active_allocator.is_some() {
            return Err(
                self.validation_error("begin_frame called twice without an intervening present")
            );
        }

        // The pool only reuses an allocator whose last frame the GPU has
        // retired; the throttle in `present` guarantees at least one such
        // allocator exists once the pool has warmed up.
        let allocator = self
            .inner
            .command_allocator_pool
            .request(&self.inner.backend_device_context, self.inner.frame_fence.poll())?;
        frame.active_allocator = Some(allocator);

        // The throttle has proven the GPU done with this slot's previous
        // frame, so its transient descriptors are reclaimable in one step.
        self.inner.descriptor_heap.reset_partition(frame.frame_index);

        trace!("begin_frame {}", frame.current_cpu_frame + 1);
        Ok(CommandBuffer::new())
    }

    /// Ends the frame: submits the recorded commands, signals the frame
    /// fence, presents, throttles the CPU to `max_frame_latency` frames
    /// ahead, and retires the deferred releases whose safety the throttle
    /// just proved.
    pub fn present(
        &self,
        command_buffer: &CommandBuffer,
        swapchains: &[&Swapchain],
    ) -> GfxResult<PresentResult> {
        if self.is_device_lost() {
            return Err(GfxError::DeviceLost);
        }
        // A buffer that was begun must be ended before it can be
        // submitted; a never-begun one is an allowed empty frame.
        if command_buffer.is_recording() {
            return Err(self.validation_error("presenting a command buffer that was not ended"));
        }

        let mut frame = self.inner.frame.lock();
        let allocator = frame
            .active_allocator
            .take()
            .ok_or_else(|| self.validation_error("present without a begin_frame"))?;

        let command_count = command_buffer.command_count();
        if let Err(error) = self.inner.graphics_queue.submit(command_count) {
            // The GPU never saw the allocator's commands; it is reusable
            // as soon as prior work retires.
            self.inner
                .command_allocator_pool
                .discard(self.inner.frame_fence.submitted_value(), allocator);
            return Err(self.latch(error));
        }

        frame.current_cpu_frame += 1;
        let fence_value = self.inner.frame_fence.next_value();
        debug_assert_eq!(fence_value, frame.current_cpu_frame);

        if let Err(error) = self
            .inner
            .graphics_queue
            .signal(self.inner.frame_fence.backend_fence.completion(), fence_value)
        {
            self.inner
                .command_allocator_pool
                .discard(fence_value, allocator);
            return Err(self.latch(error));
        }
        self.inner
            .command_allocator_pool
            .discard(fence_value, allocator);

        let mut any_suboptimal = false;
        for swapchain in swapchains {
            match self
                .inner
                .graphics_queue
                .present(swapchain.backend_swapchain())
            {
                Ok(PresentResult::Success) => {}
                Ok(PresentResult::Suboptimal) => any_suboptimal = true,
                Err(error) => return Err(self.latch(error)),
            }
        }
        if any_suboptimal {
            self.inner
                .metrics
                .suboptimal_presents
                .fetch_add(1, Ordering::Relaxed);
        }

        // Frame throttle: never let the CPU record more than
        // `max_frame_latency` frames the GPU has not finished.
        if frame.current_cpu_frame - frame.current_gpu_frame >= self.inner.max_frame_latency {
            let target = frame.current_cpu_frame - self.inner.max_frame_latency + 1;
            if self.inner.frame_fence.poll() < target {
                self.inner
                    .metrics
                    .throttle_waits
                    .fetch_add(1, Ordering::Relaxed);
            }
            if let Err(error) = self.inner.frame_fence.wait(target) {
                return Err(self.latch(error));
            }
            frame.current_gpu_frame = target;
        }

        // The slot being rotated into was last used `max_frame_latency`
        // frames ago, which the wait above just proved retired.
        self.inner.deferred_dropper.flush(frame.frame_index);
        frame.frame_index = frame.current_cpu_frame % self.inner.max_frame_latency;

        self.inner
            .metrics
            .frames_submitted
            .fetch_add(1, Ordering::Relaxed);
        trace!("present frame {}", frame.current_cpu_frame);

        Ok(if any_suboptimal {
            PresentResult::Suboptimal
        } else {
            PresentResult::Success
        })
    }

    /// Blocks until the GPU has executed everything submitted so far, then
    /// runs every pending deferred release immediately.
    pub fn wait_for_idle(&self) -> GfxResult<()> {
        let mut frame = self.inner.frame.lock();
        self.inner
            .frame_fence
            .wait(self.inner.frame_fence.submitted_value())?;
        frame.current_gpu_frame = frame.current_cpu_frame;
        // Idle proven: nothing pending can still be referenced.
        self.inner.deferred_dropper.destroy();
        Ok(())
    }

    //
    // Resources
    //

    pub fn create_buffer(
        &self,
        buffer_def: BufferDef,
        name: &str,
    ) -> GfxResult<ResourceHandle<Buffer>> {
        if self.is_device_lost() {
            return Err(GfxError::DeviceLost);
        }
        let buffer = Buffer::new(self, buffer_def, name)?;
        self.inner.pools.buffers.lock().allocate(buffer)
    }

    /// Resolves a handle to its buffer. Panics on a stale handle, like any
    /// pool access.
    pub fn buffer(&self, handle: ResourceHandle<Buffer>) -> Buffer {
        self.inner.pools.buffers.lock()[handle].clone()
    }

    /// Schedules the buffer's destruction. The handle is dead immediately;
    /// the slot and the native object are reclaimed only after every frame
    /// that could reference them has retired.
    pub fn destroy_buffer(&self, handle: ResourceHandle<Buffer>) {
        debug_assert!(
            self.inner.pools.buffers.lock().get(handle).is_some(),
            "destroying a stale buffer handle"
        );
        let pools = Arc::clone(&self.inner.pools);
        self.inner.deferred_dropper.defer(move || {
            pools.buffers.lock().deallocate(handle);
        });
    }

    pub fn create_texture(
        &self,
        texture_def: TextureDef,
        name: &str,
    ) -> GfxResult<ResourceHandle<Texture>> {
        if self.is_device_lost() {
            return Err(GfxError::DeviceLost);
        }
        let texture = Texture::new(self, texture_def, name)?;
        self.inner.pools.textures.lock().allocate(texture)
    }

    pub fn texture(&self, handle: ResourceHandle<Texture>) -> Texture {
        self.inner.pools.textures.lock()[handle].clone()
    }

    pub fn destroy_texture(&self, handle: ResourceHandle<Texture>) {
        debug_assert!(
            self.inner.pools.textures.lock().get(handle).is_some(),
            "destroying a stale texture handle"
        );
        let pools = Arc::clone(&self.inner.pools);
        self.inner.deferred_dropper.defer(move || {
            pools.textures.lock().deallocate(handle);
        });
    }

    pub fn create_swapchain(&self, swapchain_def: SwapchainDef) -> GfxResult<Swapchain> {
        Swapchain::new(self, swapchain_def)
    }

    pub fn create_queue(&self, queue_type: QueueType) -> Queue {
        Queue::new(self, queue_type)
    }

    pub fn create_fence(&self) -> Fence {
        Fence::new(&self.inner.backend_device_context)
    }

    /// Manual pool access for recording outside the frame loop. The
    /// allocator is reusable once the frame fence passes the value it is
    /// later discarded with; discards must arrive in fence order.
    pub fn request_command_allocator(&self) -> GfxResult<CommandAllocator> {
        self.inner.command_allocator_pool.request(
            &self.inner.backend_device_context,
            self.inner.frame_fence.poll(),
        )
    }

    pub fn discard_command_allocator(&self, fence_value: u64, allocator: CommandAllocator) {
        self.inner
            .command_allocator_pool
            .discard(fence_value, allocator);
    }

    /// Bump-allocates `count` transient descriptors out of the current
    /// frame's partition. The range dies with the frame slot.
    pub fn allocate_transient_descriptors(&self, count: u32) -> GfxResult<DescriptorRange> {
        let frame_index = self.inner.frame.lock().frame_index;
        self.inner.descriptor_heap.allocate_range(frame_index, count)
    }

    //
    // Diagnostics and failure injection
    //

    pub fn validation_enabled(&self) -> bool {
        self.inner.validation
    }

    pub fn stats(&self) -> DeviceStats {
        let frame = self.inner.frame.lock();
        DeviceStats {
            current_cpu_frame: frame.current_cpu_frame,
            current_gpu_frame: frame.current_gpu_frame,
            frames_submitted: self.inner.metrics.frames_submitted.load(Ordering::Relaxed),
            throttle_waits: self.inner.metrics.throttle_waits.load(Ordering::Relaxed),
            suboptimal_presents: self
                .inner
                .metrics
                .suboptimal_presents
                .load(Ordering::Relaxed),
            validation_errors: self.inner.metrics.validation_errors.load(Ordering::Relaxed),
            deferred_releases_executed: self.inner.deferred_dropper.executed_count(),
            command_allocators_created: self.inner.command_allocator_pool.created_count(),
            command_allocators_reused: self.inner.command_allocator_pool.reused_count(),
            live_buffers: self.inner.pools.buffers.lock().len(),
            live_textures: self.inner.pools.textures.lock().len(),
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.inner.lost.load(Ordering::Acquire) || self.inner.backend_device_context.is_lost()
    }

    /// Simulates a device removal. Every frame operation afterwards fails
    /// with `DeviceLost` until the device is recreated.
    pub fn inject_device_loss(&self) {
        self.inner.backend_device_context.inject_device_loss();
        self.mark_device_lost();
    }

    pub(crate) fn mark_device_lost(&self) {
        if !self.inner.lost.swap(true, Ordering::AcqRel) {
            warn!("device lost; all further frame operations will fail");
        }
    }

    fn latch(&self, error: GfxError) -> GfxError {
        if error == GfxError::DeviceLost {
            self.mark_device_lost();
        }
        error
    }

    fn validation_error(&self, message: &str) -> GfxError {
        self.inner
            .metrics
            .validation_errors
            .fetch_add(1, Ordering::Relaxed);
        if self.inner.validation {
            error!("{}", message);
        }
        GfxError::ValidationFailure(message.to_string())
    }
}

impl Drop for DeviceContextInner {
    fn drop(&mut self) {
        // Best effort on a lost device; the wait fails immediately there
        // and the backend drains what it can.
        let _ = self.frame_fence.wait(self.frame_fence.submitted_value());
        self.deferred_dropper.destroy();

        {
            let mut buffers = self.pools.buffers.lock();
            if !buffers.is_empty() {
                warn!("{} buffers still live at device destruction", buffers.len());
            }
            buffers.clear();
        }
        {
            let mut textures = self.pools.textures.lock();
            if !textures.is_empty() {
                warn!(
                    "{} textures still live at device destruction",
                    textures.len()
                );
            }
            textures.clear();
        }

        // Clearing the pools re-queued the dropped resources.
        self.deferred_dropper.destroy();
        self.command_allocator_pool.destroy();
        self.backend_device_context.destroy();
    }
}
