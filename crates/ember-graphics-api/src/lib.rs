//! Device frame lifecycle and GPU resource management.
//!
//! The centerpiece is [`DeviceContext`]: it owns the frame orchestrator
//! (`begin_frame` / `present` / `wait_for_idle`), the handle pools for
//! device resources, the fence-gated command allocator pool, the
//! per-frame transient descriptor heap and the deferred release queue
//! that together guarantee nothing the GPU may still read is reclaimed
//! early, while the CPU is throttled to at most `max_frame_latency`
//! recorded-but-unfinished frames.
//!
//! Backends implement a small native contract; this build ships the
//! software reference backend, which simulates a GPU timeline well enough
//! to exercise (and deterministically test) every lifecycle rule.
//!
//! ```no_run
//! use ember_graphics_api::{ApiDef, GfxApi, PresentResult, SwapchainDef};
//!
//! # fn main() -> ember_graphics_api::GfxResult<()> {
//! let api = GfxApi::new(&ApiDef::default())?;
//! let device_context = api.device_context();
//! let swapchain = device_context.create_swapchain(SwapchainDef {
//!     width: 1280,
//!     height: 720,
//!     enable_vsync: true,
//! })?;
//!
//! loop {
//!     let mut command_buffer = device_context.begin_frame()?;
//!     command_buffer.begin()?;
//!     command_buffer.cmd_debug_marker("draw")?;
//!     command_buffer.end()?;
//!     if device_context.present(&command_buffer, &[&swapchain])? == PresentResult::Suboptimal {
//!         break;
//!     }
//! }
//! device_context.wait_for_idle()?;
//! # Ok(())
//! # }
//! ```

mod api;
mod backends;
mod buffer;
mod command_buffer;
mod command_pool;
mod deferred_drop;
mod descriptor_heap;
mod device_context;
mod error;
mod fence;
mod handle_pool;
mod queue;
mod swapchain;
mod texture;
mod types;

pub use api::*;
pub use buffer::*;
pub use command_buffer::*;
pub use command_pool::{CommandAllocator, CommandAllocatorPool};
pub use descriptor_heap::DescriptorHeapDef;
pub use device_context::{DeviceContext, DeviceInfo, DeviceStats};
pub use error::*;
pub use fence::*;
pub use handle_pool::{HandlePool, ResourceHandle};
pub use queue::*;
pub use swapchain::*;
pub use texture::*;
pub use types::*;

/// Most buffers a device can have live at once.
pub const MAX_BUFFER_COUNT: usize = 4096;
/// Most textures a device can have live at once.
pub const MAX_TEXTURE_COUNT: usize = 4096;
/// Frames the CPU may run ahead of the GPU unless overridden.
pub const DEFAULT_FRAME_LATENCY: u64 = 2;
pub const MAX_FRAME_LATENCY: u64 = 3;
/// Backbuffers per swapchain.
pub const SWAPCHAIN_IMAGE_COUNT: u32 = 3;

pub mod prelude {
    pub use crate::{
        ApiDef, Buffer, BufferDef, CommandBuffer, DeviceContext, Fence, GfxApi, GfxError,
        GfxResult, PresentResult, Queue, QueueType, ResourceHandle, Swapchain, SwapchainDef,
        Texture, TextureDef,
    };
}
