//! End-to-end frame lifecycle scenarios against the software backend.

use ember_graphics_api::{
    ApiDef, BufferDef, Extents3D, Format, GfxApi, GfxError, MemoryUsage, PresentResult,
    ResourceUsage, SwapchainDef, TextureDef,
};

fn test_api(api_def: ApiDef) -> GfxApi {
    let _ = env_logger::builder().is_test(true).try_init();
    GfxApi::new(&api_def).unwrap()
}

fn default_swapchain_def() -> SwapchainDef {
    SwapchainDef {
        width: 1280,
        height: 720,
        enable_vsync: true,
    }
}

fn run_frame(api: &GfxApi, swapchain: &ember_graphics_api::Swapchain) -> PresentResult {
    let device_context = api.device_context();
    let mut command_buffer = device_context.begin_frame().unwrap();
    command_buffer.begin().unwrap();
    command_buffer.cmd_debug_marker("frame work").unwrap();
    command_buffer.end().unwrap();
    device_context.present(&command_buffer, &[swapchain]).unwrap()
}

#[test]
fn cpu_throttles_once_it_runs_a_full_latency_ahead() {
    let api = test_api(ApiDef {
        max_frame_latency: 2,
        ..ApiDef::default()
    });
    let device_context = api.device_context();
    let swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    for _ in 0..5 {
        run_frame(&api, &swapchain);
    }

    let stats = device_context.stats();
    assert_eq!(stats.frames_submitted, 5);
    // The simulated GPU only progresses when the CPU waits on it, so from
    // the second present on every frame had to block on the frame fence;
    // certainly by the third.
    assert!(stats.throttle_waits >= 1);
    assert!(stats.current_cpu_frame - stats.current_gpu_frame < 2);

    device_context.wait_for_idle().unwrap();
    assert_eq!(device_context.stats().current_gpu_frame, 5);
}

#[test]
fn command_allocators_recycle_in_steady_state() {
    let api = test_api(ApiDef {
        max_frame_latency: 2,
        ..ApiDef::default()
    });
    let device_context = api.device_context();
    let swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    for _ in 0..12 {
        run_frame(&api, &swapchain);
    }

    // With latency 2 at most 3 allocators can be in flight at once; the
    // rest of the frames reuse.
    let stats = device_context.stats();
    assert!(stats.command_allocators_created <= 3);
    assert!(stats.command_allocators_reused >= 9);
    device_context.wait_for_idle().unwrap();
}

#[test]
fn handle_pool_exhaustion_is_reported_and_recoverable() {
    let api = test_api(ApiDef {
        buffer_pool_capacity: 8,
        ..ApiDef::default()
    });
    let device_context = api.device_context();

    let buffer_def = BufferDef {
        size: 256,
        usage_flags: ResourceUsage::AS_CONST_BUFFER,
        memory_usage: MemoryUsage::CpuToGpu,
    };

    let handles: Vec<_> = (0..8)
        .map(|i| {
            device_context
                .create_buffer(buffer_def, &format!("buffer {}", i))
                .unwrap()
        })
        .collect();

    // Ninth and tenth fail cleanly.
    for _ in 0..2 {
        assert_eq!(
            device_context.create_buffer(buffer_def, "overflow"),
            Err(GfxError::PoolExhausted {
                kind: "buffer",
                capacity: 8
            })
        );
    }

    // The pool stays consistent: surviving handles resolve and the device
    // still runs frames.
    assert_eq!(device_context.stats().live_buffers, 8);
    device_context.buffer(handles[0]).write(0, &[1, 2, 3]).unwrap();

    for handle in handles {
        device_context.destroy_buffer(handle);
    }
    device_context.wait_for_idle().unwrap();
    assert_eq!(device_context.stats().live_buffers, 0);

    device_context.create_buffer(buffer_def, "after").unwrap();
}

#[test]
fn destroyed_resources_outlive_frames_that_reference_them() {
    let api = test_api(ApiDef {
        max_frame_latency: 2,
        ..ApiDef::default()
    });
    let device_context = api.device_context();
    let swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    let handle = device_context
        .create_texture(
            TextureDef {
                extents: Extents3D {
                    width: 64,
                    height: 64,
                    depth: 1,
                },
                format: Format::R8G8B8A8_UNORM,
                usage_flags: ResourceUsage::AS_SHADER_RESOURCE,
            },
            "transient texture",
        )
        .unwrap();

    // Destroy mid-frame: the handle is dead, but the slot is not reused
    // until the frames that could reference the texture have retired.
    let mut command_buffer = device_context.begin_frame().unwrap();
    command_buffer.begin().unwrap();
    command_buffer.cmd_debug_marker("sample texture").unwrap();
    command_buffer.end().unwrap();
    device_context.destroy_texture(handle);
    assert_eq!(device_context.stats().live_textures, 1);
    device_context
        .present(&command_buffer, &[&swapchain])
        .unwrap();

    // One more full frame retires the deferred bucket.
    assert_eq!(device_context.stats().live_textures, 1);
    run_frame(&api, &swapchain);
    assert_eq!(device_context.stats().live_textures, 0);

    device_context.wait_for_idle().unwrap();
}

#[test]
fn device_loss_latches_and_fails_fast() {
    let api = test_api(ApiDef::default());
    let device_context = api.device_context();
    let swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    run_frame(&api, &swapchain);

    let command_buffer = device_context.begin_frame().unwrap();
    device_context.inject_device_loss();

    assert_eq!(
        device_context.present(&command_buffer, &[&swapchain]),
        Err(GfxError::DeviceLost)
    );
    assert!(device_context.is_device_lost());

    // Latched: everything fails immediately, no timeouts involved.
    assert!(matches!(
        device_context.begin_frame(),
        Err(GfxError::DeviceLost)
    ));
    assert!(matches!(
        device_context.create_buffer(
            BufferDef {
                size: 16,
                usage_flags: ResourceUsage::AS_CONST_BUFFER,
                memory_usage: MemoryUsage::GpuOnly,
            },
            "post-loss"
        ),
        Err(GfxError::DeviceLost)
    ));
    assert!(matches!(
        swapchain.acquire_next_image(),
        Err(GfxError::DeviceLost)
    ));
}

#[test]
fn suboptimal_present_requests_a_rebuild() {
    let api = test_api(ApiDef::default());
    let device_context = api.device_context();
    let mut swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    assert_eq!(run_frame(&api, &swapchain), PresentResult::Success);

    // Window resized out from under the swapchain.
    swapchain.set_window_extent(1920, 1080);
    assert_eq!(run_frame(&api, &swapchain), PresentResult::Suboptimal);
    assert!(device_context.stats().suboptimal_presents >= 1);

    swapchain
        .rebuild(SwapchainDef {
            width: 1920,
            height: 1080,
            enable_vsync: true,
        })
        .unwrap();
    assert_eq!(run_frame(&api, &swapchain), PresentResult::Success);
    device_context.wait_for_idle().unwrap();
}

#[test]
fn presenting_an_unended_command_buffer_is_a_validation_error() {
    let api = test_api(ApiDef::default());
    let device_context = api.device_context();
    let swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    let mut command_buffer = device_context.begin_frame().unwrap();
    command_buffer.begin().unwrap();

    // Still recording, even with nothing recorded yet.
    assert!(matches!(
        device_context.present(&command_buffer, &[&swapchain]),
        Err(GfxError::ValidationFailure(_))
    ));
    assert!(device_context.stats().validation_errors >= 1);

    // The frame is still open; ending the buffer lets it through.
    command_buffer.end().unwrap();
    device_context
        .present(&command_buffer, &[&swapchain])
        .unwrap();
    device_context.wait_for_idle().unwrap();
}

#[test]
fn transient_descriptors_reset_with_their_frame_slot() {
    let api = test_api(ApiDef {
        max_frame_latency: 2,
        ..ApiDef::default()
    });
    let device_context = api.device_context();
    let swapchain = device_context
        .create_swapchain(default_swapchain_def())
        .unwrap();

    // Same slot allocates from offset zero again two frames later.
    let mut first_offsets = Vec::new();
    for _ in 0..4 {
        let mut command_buffer = device_context.begin_frame().unwrap();
        let range = device_context.allocate_transient_descriptors(16).unwrap();
        first_offsets.push(range.first);
        command_buffer.begin().unwrap();
        command_buffer.end().unwrap();
        device_context
            .present(&command_buffer, &[&swapchain])
            .unwrap();
    }
    assert_eq!(first_offsets, vec![0, 0, 0, 0]);
    device_context.wait_for_idle().unwrap();
}

#[test]
fn abandoned_command_allocators_do_not_leak_device_memory() {
    // Room for two 64 KiB command allocators and nothing else.
    let api = test_api(ApiDef {
        memory_budget: Some(128 * 1024),
        ..ApiDef::default()
    });
    let device_context = api.device_context();

    let first = device_context.request_command_allocator().unwrap();
    let second = device_context.request_command_allocator().unwrap();
    drop(first);
    drop(second);

    // Their memory is back; a fresh request must not hit the budget.
    let third = device_context.request_command_allocator().unwrap();
    device_context.discard_command_allocator(1, third);
}

#[test]
fn memory_budget_failures_surface_as_out_of_memory() {
    let api = test_api(ApiDef {
        memory_budget: Some(1024 * 1024),
        ..ApiDef::default()
    });
    let device_context = api.device_context();

    let result = device_context.create_texture(
        TextureDef {
            extents: Extents3D {
                width: 4096,
                height: 4096,
                depth: 1,
            },
            format: Format::R16G16B16A16_SFLOAT,
            usage_flags: ResourceUsage::AS_RENDER_TARGET,
        },
        "too big",
    );
    assert!(matches!(result, Err(GfxError::OutOfMemory(_))));

    // A fitting allocation still succeeds.
    device_context
        .create_buffer(
            BufferDef {
                size: 1024,
                usage_flags: ResourceUsage::AS_VERTEX_BUFFER,
                memory_usage: MemoryUsage::GpuOnly,
            },
            "small",
        )
        .unwrap();
}
