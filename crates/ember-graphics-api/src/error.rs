use thiserror::Error;

/// Generic error type for anything the graphics layer can fail on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GfxError {
    /// A fixed-capacity pool is full. Capacities are engine-wide constants,
    /// so the only recovery is raising the capacity and recreating the
    /// device.
    #[error("{kind} pool exhausted (capacity {capacity})")]
    PoolExhausted { kind: &'static str, capacity: usize },

    /// The native device reported removed/reset/hung. Latched by the
    /// device context: every subsequent submission fails the same way
    /// until the device is recreated.
    #[error("device lost")]
    DeviceLost,

    /// A native allocation failed (command allocator, descriptor heap or
    /// backing resource memory).
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The validation layer flagged an invalid call.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// No requested or fallback backend is available on this build.
    #[error("no supported backend")]
    UnsupportedBackend,
}

pub type GfxResult<T> = Result<T, GfxError>;
