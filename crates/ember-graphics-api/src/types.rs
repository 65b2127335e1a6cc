use bitflags::bitflags;

/// Identifies a backend implementation. Matches the driver table of the
/// original C layer: explicit requests are honored when the backend is
/// compiled in, otherwise selection walks [`BACKEND_PROBE_ORDER`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Probe backends in priority order and take the first supported one.
    Default,
    D3d11,
    D3d12,
    Vulkan,
    OpenGl,
    /// Reference backend simulating a GPU timeline on the CPU. Always
    /// supported; also the fallback when nothing native is compiled in.
    Software,
}

/// Probe priority used when `BackendType::Default` is requested or when an
/// explicitly requested backend is unavailable.
pub const BACKEND_PROBE_ORDER: [BackendType; 5] = [
    BackendType::D3d12,
    BackendType::Vulkan,
    BackendType::D3d11,
    BackendType::OpenGl,
    BackendType::Software,
];

impl BackendType {
    pub fn is_supported(self) -> bool {
        // Native backends are selected at compile time; this build carries
        // only the software reference backend.
        matches!(self, Self::Software)
    }
}

/// Used to specify which type of physical adapter is preferred.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdapterType {
    DiscreteGpu,
    IntegratedGpu,
    Cpu,
    Any,
}

/// Texture formats. Only the handful the lifecycle layer needs; format
/// translation tables live with the backends that consume them.
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    R8G8B8A8_UNORM,
    B8G8R8A8_UNORM,
    R16G16B16A16_SFLOAT,
    D32_SFLOAT,
}

impl Format {
    pub fn block_size(self) -> u64 {
        match self {
            Self::R8G8B8A8_UNORM | Self::B8G8R8A8_UNORM | Self::D32_SFLOAT => 4,
            Self::R16G16B16A16_SFLOAT => 8,
        }
    }
}

/// Texture dimensions. 2D textures use `depth == 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extents3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Memory placement of a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemoryUsage {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

bitflags! {
    /// How a resource may be bound.
    pub struct ResourceUsage: u32 {
        const AS_VERTEX_BUFFER = 0x0001;
        const AS_INDEX_BUFFER = 0x0002;
        const AS_CONST_BUFFER = 0x0004;
        const AS_SHADER_RESOURCE = 0x0008;
        const AS_UNORDERED_ACCESS = 0x0010;
        const AS_RENDER_TARGET = 0x0020;
        const AS_DEPTH_STENCIL = 0x0040;
        const AS_TRANSFERABLE = 0x0080;

        const BUFFER_ONLY_USAGE_FLAGS =
            Self::AS_VERTEX_BUFFER.bits | Self::AS_INDEX_BUFFER.bits | Self::AS_CONST_BUFFER.bits;
        const TEXTURE_ONLY_USAGE_FLAGS =
            Self::AS_RENDER_TARGET.bits | Self::AS_DEPTH_STENCIL.bits;
    }
}

/// Result of a present. `Suboptimal` means the frame was shown but the
/// swapchain no longer matches its window and should be rebuilt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentResult {
    Success,
    Suboptimal,
}

/// A contiguous range inside a GPU-visible descriptor heap, allocated
/// bump-pointer style and recycled wholesale when the owning frame slot
/// retires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorRange {
    pub first: u32,
    pub count: u32,
}
