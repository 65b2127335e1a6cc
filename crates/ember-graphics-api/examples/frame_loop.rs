//! Minimal frame loop against the software backend. Run with
//! `RUST_LOG=trace` to watch the lifecycle.

use ember_graphics_api::{
    ApiDef, BufferDef, GfxApi, GfxResult, MemoryUsage, ResourceUsage, SwapchainDef,
};

fn main() -> GfxResult<()> {
    env_logger::init();

    let api = GfxApi::new(&ApiDef::default())?;
    let device_context = api.device_context();
    let swapchain = device_context.create_swapchain(SwapchainDef {
        width: 1280,
        height: 720,
        enable_vsync: true,
    })?;

    let uniforms = device_context.create_buffer(
        BufferDef {
            size: 256,
            usage_flags: ResourceUsage::AS_CONST_BUFFER,
            memory_usage: MemoryUsage::CpuToGpu,
        },
        "frame uniforms",
    )?;

    for frame in 0..60_u32 {
        let mut command_buffer = device_context.begin_frame()?;
        device_context
            .buffer(uniforms)
            .write(0, &frame.to_le_bytes())?;

        command_buffer.begin()?;
        command_buffer.cmd_debug_marker("clear")?;
        command_buffer.cmd_debug_marker("draw scene")?;
        command_buffer.end()?;

        device_context.present(&command_buffer, &[&swapchain])?;
    }

    device_context.destroy_buffer(uniforms);
    device_context.wait_for_idle()?;

    let stats = device_context.stats();
    println!(
        "60 frames, {} throttle waits, {} allocators created, {} reused",
        stats.throttle_waits, stats.command_allocators_created, stats.command_allocators_reused
    );
    Ok(())
}
