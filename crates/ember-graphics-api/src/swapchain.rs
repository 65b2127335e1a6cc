use crate::backends::BackendSwapchain;
use crate::{
    DeviceContext, Extents3D, Format, GfxError, GfxResult, ResourceUsage, Texture, TextureDef,
};

/// Creation parameters for a [`Swapchain`].
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDef {
    pub width: u32,
    pub height: u32,
    pub enable_vsync: bool,
}

impl SwapchainDef {
    pub fn verify(&self) -> GfxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GfxError::ValidationFailure(
                "swapchain extents must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Presentable image chain. Owns its backbuffer textures; they are
/// replaced wholesale on [`Swapchain::rebuild`], with the old set released
/// through the deferred queue like any other resource.
pub struct Swapchain {
    device_context: DeviceContext,
    swapchain_def: SwapchainDef,
    backbuffers: Vec<Texture>,
    backend_swapchain: BackendSwapchain,
}

impl Swapchain {
    pub(crate) fn new(
        device_context: &DeviceContext,
        swapchain_def: SwapchainDef,
    ) -> GfxResult<Self> {
        swapchain_def.verify()?;
        let backend_swapchain = BackendSwapchain::new(
            device_context.backend_device_context(),
            &swapchain_def,
            crate::SWAPCHAIN_IMAGE_COUNT,
        )?;
        let backbuffers =
            Self::create_backbuffers(device_context, &swapchain_def, backend_swapchain.image_count())?;
        Ok(Self {
            device_context: device_context.clone(),
            swapchain_def,
            backbuffers,
            backend_swapchain,
        })
    }

    fn create_backbuffers(
        device_context: &DeviceContext,
        swapchain_def: &SwapchainDef,
        image_count: u32,
    ) -> GfxResult<Vec<Texture>> {
        (0..image_count)
            .map(|image_index| {
                Texture::new(
                    device_context,
                    TextureDef {
                        extents: Extents3D {
                            width: swapchain_def.width,
                            height: swapchain_def.height,
                            depth: 1,
                        },
                        format: Format::B8G8R8A8_UNORM,
                        usage_flags: ResourceUsage::AS_RENDER_TARGET,
                    },
                    &format!("Backbuffer {}", image_index),
                )
            })
            .collect()
    }

    pub fn definition(&self) -> &SwapchainDef {
        &self.swapchain_def
    }

    pub fn image_count(&self) -> u32 {
        self.backend_swapchain.image_count()
    }

    /// Index of the backbuffer to render the current frame into.
    pub fn acquire_next_image(&self) -> GfxResult<u32> {
        if self.device_context.is_device_lost() {
            return Err(GfxError::DeviceLost);
        }
        Ok(self.backend_swapchain.acquire_next_image())
    }

    pub fn backbuffer(&self, image_index: u32) -> &Texture {
        &self.backbuffers[image_index as usize]
    }

    /// Replaces the image chain, typically after a `Suboptimal` present.
    /// Old backbuffers stay alive until every frame that could sample them
    /// has retired.
    pub fn rebuild(&mut self, swapchain_def: SwapchainDef) -> GfxResult<()> {
        swapchain_def.verify()?;
        self.backend_swapchain.rebuild(&swapchain_def);
        self.backbuffers = Self::create_backbuffers(
            &self.device_context,
            &swapchain_def,
            self.backend_swapchain.image_count(),
        )?;
        self.swapchain_def = swapchain_def;
        Ok(())
    }

    /// Simulates a window resize without rebuilding; subsequent presents
    /// report `Suboptimal` until [`Swapchain::rebuild`] is called.
    pub fn set_window_extent(&self, width: u32, height: u32) {
        self.backend_swapchain.set_window_extent(width, height);
    }

    pub(crate) fn backend_swapchain(&self) -> &BackendSwapchain {
        &self.backend_swapchain
    }
}
