use crate::backends::BackendTexture;
use crate::deferred_drop::Drc;
use crate::{DeviceContext, Extents3D, Format, GfxError, GfxResult, ResourceUsage};

/// Creation parameters for a [`Texture`].
#[derive(Debug, Clone, Copy)]
pub struct TextureDef {
    pub extents: Extents3D,
    pub format: Format,
    pub usage_flags: ResourceUsage,
}

impl Default for TextureDef {
    fn default() -> Self {
        Self {
            extents: Extents3D {
                width: 0,
                height: 0,
                depth: 1,
            },
            format: Format::R8G8B8A8_UNORM,
            usage_flags: ResourceUsage::empty(),
        }
    }
}

impl TextureDef {
    pub fn verify(&self) -> GfxResult<()> {
        if self.extents.width == 0 || self.extents.height == 0 || self.extents.depth == 0 {
            return Err(GfxError::ValidationFailure(
                "texture extents must be non-zero".to_string(),
            ));
        }
        if self
            .usage_flags
            .intersects(ResourceUsage::BUFFER_ONLY_USAGE_FLAGS)
        {
            return Err(GfxError::ValidationFailure(
                "buffer-only usage flags on a texture".to_string(),
            ));
        }
        Ok(())
    }

    pub fn byte_size(&self) -> u64 {
        u64::from(self.extents.width)
            * u64::from(self.extents.height)
            * u64::from(self.extents.depth)
            * self.format.block_size()
    }
}

pub(crate) struct TextureInner {
    texture_def: TextureDef,
    name: String,
    backend_texture: BackendTexture,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.backend_texture.destroy();
    }
}

/// GPU texture, deferred-ref-counted like [`crate::Buffer`].
#[derive(Clone)]
pub struct Texture {
    inner: Drc<TextureInner>,
}

impl Texture {
    pub(crate) fn new(
        device_context: &DeviceContext,
        texture_def: TextureDef,
        name: &str,
    ) -> GfxResult<Self> {
        texture_def.verify()?;
        let backend_texture = device_context
            .backend_device_context()
            .create_texture(&texture_def, name)?;
        Ok(Self {
            inner: device_context.deferred_dropper().new_drc(TextureInner {
                texture_def,
                name: name.to_string(),
                backend_texture,
            }),
        })
    }

    pub fn definition(&self) -> &TextureDef {
        &self.inner.texture_def
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn native_id(&self) -> u64 {
        self.inner.backend_texture.native_id()
    }
}
