use crate::backends::BackendBuffer;
use crate::deferred_drop::Drc;
use crate::{DeviceContext, GfxError, GfxResult, MemoryUsage, ResourceUsage};

/// Creation parameters for a [`Buffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferDef {
    pub size: u64,
    pub usage_flags: ResourceUsage,
    pub memory_usage: MemoryUsage,
}

impl Default for BufferDef {
    fn default() -> Self {
        Self {
            size: 0,
            usage_flags: ResourceUsage::empty(),
            memory_usage: MemoryUsage::GpuOnly,
        }
    }
}

impl BufferDef {
    pub fn verify(&self) -> GfxResult<()> {
        if self.size == 0 {
            return Err(GfxError::ValidationFailure(
                "buffer size must be non-zero".to_string(),
            ));
        }
        if self
            .usage_flags
            .intersects(ResourceUsage::TEXTURE_ONLY_USAGE_FLAGS)
        {
            return Err(GfxError::ValidationFailure(
                "texture-only usage flags on a buffer".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) struct BufferInner {
    buffer_def: BufferDef,
    name: String,
    backend_buffer: BackendBuffer,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.backend_buffer.destroy();
    }
}

/// GPU buffer. Internally deferred-ref-counted: clones are cheap, and the
/// native object is released only when the last clone is gone and the GPU
/// has retired every frame that could reference it.
#[derive(Clone)]
pub struct Buffer {
    inner: Drc<BufferInner>,
}

impl Buffer {
    pub(crate) fn new(
        device_context: &DeviceContext,
        buffer_def: BufferDef,
        name: &str,
    ) -> GfxResult<Self> {
        buffer_def.verify()?;
        let backend_buffer = device_context
            .backend_device_context()
            .create_buffer(&buffer_def, name)?;
        Ok(Self {
            inner: device_context.deferred_dropper().new_drc(BufferInner {
                buffer_def,
                name: name.to_string(),
                backend_buffer,
            }),
        })
    }

    pub fn definition(&self) -> &BufferDef {
        &self.inner.buffer_def
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn native_id(&self) -> u64 {
        self.inner.backend_buffer.native_id()
    }

    /// Copies `data` into the buffer at `byte_offset`. Only valid on
    /// CPU-visible memory (`CpuToGpu` or `GpuToCpu`).
    pub fn write(&self, byte_offset: u64, data: &[u8]) -> GfxResult<()> {
        self.inner.backend_buffer.write(byte_offset, data)
    }
}
