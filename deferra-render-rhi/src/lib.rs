//! Render hardware interface.
//!
//! The frame orchestration in `deferra-render` is written against the traits
//! in [`device`]. [`vulkan`] is the production backend; `mock` (behind the
//! `mock` feature) is an in-process GPU used by tests.

pub mod device;
pub mod error;
pub mod state;
pub mod types;
pub mod vulkan;

mod macros;

#[cfg(feature = "mock")]
pub mod mock;

pub use device::{
    CommandAllocator, CommandList, Fence, Queue, RenderDevice, SwapChain, TextureBarrier,
};
pub use error::{Result, RhiError};
pub use state::ResourceState;
pub use types::{
    DepthTest, Extent2D, Format, PipelineInfo, ShaderBlob, ShaderStage, TextureDimension,
    TextureInfo, TextureUsage, ViewKind,
};
