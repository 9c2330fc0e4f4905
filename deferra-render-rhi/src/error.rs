use ash::vk;

/// Errors reported by a render backend.
///
/// Every variant is fatal for the frame loop: callers propagate it and never
/// retry the failed call.
#[derive(Debug, thiserror::Error)]
pub enum RhiError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("GPU memory allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    #[error("no physical device supports Vulkan {required} with graphics and presentation")]
    NoSuitableDevice { required: String },

    #[error("format {0:?} is not supported by the surface")]
    UnsupportedFormat(crate::Format),

    #[error("invalid SPIR-V blob `{name}`: {source}")]
    InvalidShader {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("the device was lost")]
    DeviceLost,
}

pub type Result<T, E = RhiError> = std::result::Result<T, E>;
