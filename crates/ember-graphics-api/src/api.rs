use log::{debug, info};

use crate::{
    AdapterType, BackendType, DescriptorHeapDef, DeviceContext, GfxError, GfxResult,
    BACKEND_PROBE_ORDER, DEFAULT_FRAME_LATENCY, MAX_BUFFER_COUNT, MAX_TEXTURE_COUNT,
};

/// Creation parameters for the whole API.
#[derive(Debug, Clone)]
pub struct ApiDef {
    /// Requested backend; `Default` probes [`BACKEND_PROBE_ORDER`].
    pub backend_type: BackendType,
    /// Enables the backend validation layer where one exists.
    pub validation: bool,
    /// How many frames the CPU may record ahead of the GPU. Clamped to
    /// `1..=MAX_FRAME_LATENCY`.
    pub max_frame_latency: u64,
    pub preferred_adapter: AdapterType,
    /// Device memory cap in bytes; `None` means whatever the adapter has.
    pub memory_budget: Option<u64>,
    pub buffer_pool_capacity: usize,
    pub texture_pool_capacity: usize,
    /// Sizing of the per-frame transient descriptor partitions.
    pub transient_descriptor_heap_def: DescriptorHeapDef,
}

impl Default for ApiDef {
    fn default() -> Self {
        Self {
            backend_type: BackendType::Default,
            validation: cfg!(debug_assertions),
            max_frame_latency: DEFAULT_FRAME_LATENCY,
            preferred_adapter: AdapterType::Any,
            memory_budget: None,
            buffer_pool_capacity: MAX_BUFFER_COUNT,
            texture_pool_capacity: MAX_TEXTURE_COUNT,
            transient_descriptor_heap_def: DescriptorHeapDef::default(),
        }
    }
}

fn select_backend(requested: BackendType) -> GfxResult<BackendType> {
    if requested != BackendType::Default && requested.is_supported() {
        return Ok(requested);
    }
    for candidate in BACKEND_PROBE_ORDER {
        if candidate.is_supported() {
            if requested != BackendType::Default {
                debug!(
                    "backend {:?} unavailable, falling back to {:?}",
                    requested, candidate
                );
            }
            return Ok(candidate);
        }
    }
    Err(GfxError::UnsupportedBackend)
}

/// Root object. Creating one selects a backend and brings up the device;
/// dropping it tears the device down once every outstanding
/// [`DeviceContext`] clone is gone.
pub struct GfxApi {
    backend_type: BackendType,
    device_context: DeviceContext,
}

impl GfxApi {
    pub fn new(api_def: &ApiDef) -> GfxResult<Self> {
        let backend_type = select_backend(api_def.backend_type)?;
        let device_context = DeviceContext::new(api_def)?;
        info!(
            "graphics api initialized ({:?}, \"{}\")",
            backend_type,
            device_context.device_info().adapter_name
        );
        Ok(Self {
            backend_type,
            device_context,
        })
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.device_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_selects_the_software_fallback() {
        assert_eq!(
            select_backend(BackendType::Default).unwrap(),
            BackendType::Software
        );
    }

    #[test]
    fn unavailable_backend_falls_back_along_the_probe_order() {
        assert_eq!(
            select_backend(BackendType::Vulkan).unwrap(),
            BackendType::Software
        );
        assert_eq!(
            select_backend(BackendType::Software).unwrap(),
            BackendType::Software
        );
    }
}
