//! The backend seam.
//!
//! A backend provides a [`RenderDevice`] whose associated types implement the
//! rest of the traits in this module. Everything above the RHI is generic
//! over `D: RenderDevice` and never names a backend type directly.

use crate::{
    Result,
    state::ResourceState,
    types::{Extent2D, Format, PipelineInfo, TextureInfo, ViewKind},
};

/// A logical GPU device. Only used at initialization: every GPU object the
/// frame loop touches is created through one of these factories.
pub trait RenderDevice: Send + Sync + Sized + 'static {
    type Texture: Send + Sync;
    type View: Send + Sync;
    type Pipeline: Send + Sync;
    type CommandAllocator: CommandAllocator;
    type CommandList: CommandList<Self>;
    type Fence: Fence;
    type Queue: Queue<Self>;
    type SwapChain: SwapChain<Self>;

    /// Creates a texture. Its contents start out in [`ResourceState::Undefined`].
    fn create_texture(&self, info: &TextureInfo) -> Result<Self::Texture>;

    fn create_view(&self, texture: &Self::Texture, kind: ViewKind) -> Result<Self::View>;

    fn create_pipeline(&self, info: &PipelineInfo) -> Result<Self::Pipeline>;

    fn create_command_allocator(&self) -> Result<Self::CommandAllocator>;

    /// Creates a command list in the closed state. It must be reset against
    /// an allocator before recording.
    fn create_command_list(&self, allocator: &Self::CommandAllocator) -> Result<Self::CommandList>;

    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence>;
}

/// Backing memory for recorded commands.
pub trait CommandAllocator: Send {
    /// Reclaims the memory of every list recorded against this allocator.
    ///
    /// The caller guarantees the GPU finished executing those lists.
    fn reset(&mut self) -> Result<()>;
}

/// A state transition of a whole texture.
pub struct TextureBarrier<'a, D: RenderDevice> {
    pub texture: &'a D::Texture,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// A recordable list of GPU commands.
pub trait CommandList<D: RenderDevice>: Send {
    /// Starts recording into `allocator`, optionally binding `pipeline`.
    fn reset(&mut self, allocator: &D::CommandAllocator, pipeline: Option<&D::Pipeline>)
        -> Result<()>;

    /// Finishes recording. The list can then be submitted.
    fn close(&mut self) -> Result<()>;

    fn resource_barriers(&mut self, barriers: &[TextureBarrier<'_, D>]);

    fn clear_render_target(&mut self, view: &D::View, color: [f32; 4]);

    fn clear_depth_stencil(&mut self, view: &D::View, depth: f32, stencil: u8);

    fn set_render_targets(&mut self, colors: &[&D::View], depth: Option<&D::View>);

    fn set_pipeline(&mut self, pipeline: &D::Pipeline);

    /// Binds views for sampling by the current pipeline, in binding order.
    fn set_shader_resources(&mut self, views: &[&D::View]);

    /// Sets the push constants of the current pipeline.
    fn set_constants(&mut self, data: &[u8]);

    fn draw(&mut self, vertex_count: u32, instance_count: u32);
}

/// A 64-bit counter signaled by the GPU.
pub trait Fence: Send + Sync {
    /// The last value the GPU signaled. Never decreases.
    fn completed_value(&self) -> u64;

    /// Blocks the calling thread until the completed value reaches `value`.
    fn wait(&self, value: u64) -> Result<()>;
}

/// A GPU queue. Work executes in submission order.
pub trait Queue<D: RenderDevice>: Send {
    /// Enqueues a closed command list. Does not block.
    fn submit(&self, list: &D::CommandList) -> Result<()>;

    /// Enqueues a signal of `fence` to `value`, after all work submitted so far.
    fn signal(&self, fence: &D::Fence, value: u64) -> Result<()>;
}

/// A set of presentable back buffers.
pub trait SwapChain<D: RenderDevice>: Send {
    fn buffer_count(&self) -> u32;

    /// Index of the back buffer the next frame renders into.
    fn current_back_buffer_index(&self) -> u32;

    /// Returns a handle to a back buffer. The swap chain keeps ownership of
    /// the underlying image.
    fn back_buffer(&self, index: u32) -> Result<D::Texture>;

    /// The state back buffers are in right after creation.
    fn initial_state(&self) -> ResourceState;

    fn format(&self) -> Format;

    fn extent(&self) -> Extent2D;

    /// Presents the current back buffer and advances to the next one.
    fn present(&mut self, queue: &D::Queue, sync_interval: u32) -> Result<()>;
}
